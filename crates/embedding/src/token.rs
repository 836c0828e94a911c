//! Token embedding layer and optional tied readout head.

use candle_core::{bail, DType, Device, Error, Result, Tensor, Var};

/// Configuration for building a token embedding table.
#[derive(Debug, Clone)]
pub struct TokenEmbeddingConfig {
    /// Size of the vocabulary (number of distinct tokens).
    pub vocab_size: usize,
    /// Dimensionality of each embedding vector.
    pub hidden_dim: usize,
    /// Device hosting the parameters.
    pub device: Device,
}

/// Learnable token embedding table with optional tied projection head.
#[derive(Debug, Clone)]
pub struct TokenEmbedding {
    config: TokenEmbeddingConfig,
    weight: Var,
}

impl TokenEmbedding {
    /// Builds a new token embedding table with parameters sampled from
    /// `N(0, 1/hidden_dim)`.
    pub fn new(config: TokenEmbeddingConfig) -> Result<Self> {
        if config.vocab_size == 0 {
            bail!("token embedding requires vocab_size > 0");
        }
        if config.hidden_dim == 0 {
            bail!("token embedding requires hidden_dim > 0");
        }

        let std = (1.0 / config.hidden_dim as f64).sqrt() as f32;
        let shape = (config.vocab_size, config.hidden_dim);
        let weight = Var::randn(0f32, std, shape, &config.device)?;
        log::debug!(
            "token embedding table: vocab {} x dim {}",
            config.vocab_size,
            config.hidden_dim
        );
        Ok(Self { config, weight })
    }

    /// Returns the embedding configuration.
    pub fn config(&self) -> &TokenEmbeddingConfig {
        &self.config
    }

    /// Returns a handle to the underlying weight tensor.
    pub fn weight(&self) -> Tensor {
        self.weight.as_tensor().clone()
    }

    /// Looks up embeddings for the provided token ids.
    ///
    /// Ids may have any non-empty shape and an integer dtype; the output
    /// appends a `hidden_dim` axis to that shape.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        validate_token_ids(token_ids)?;
        let flat = token_ids.flatten_all()?.to_dtype(DType::I64)?;
        self.ensure_id_range(&flat)?;

        let gathered = self.weight.as_tensor().index_select(&flat, 0)?;
        let mut output_dims = token_ids.dims().to_vec();
        output_dims.push(self.config.hidden_dim);
        gathered.reshape(output_dims)
    }

    /// Applies a tied linear projection using the transpose of the embedding weight.
    ///
    /// `hidden` is shaped `(.., hidden_dim)`; the result is `(.., vocab_size)`.
    pub fn linear_out(&self, hidden: &Tensor) -> Result<Tensor> {
        let dims = hidden.dims();
        let hidden_dim = dims.last().copied().unwrap_or(0);
        if hidden_dim != self.config.hidden_dim {
            return Err(Error::Msg(format!(
                "linear_out expected hidden dim {} but received {}",
                self.config.hidden_dim, hidden_dim
            )));
        }

        let rows: usize = dims[..dims.len() - 1].iter().product();
        let flat = hidden.reshape((rows, hidden_dim))?;
        let logits = flat.matmul(&self.weight.as_tensor().t()?)?;

        let mut out_dims = dims.to_vec();
        if let Some(last) = out_dims.last_mut() {
            *last = self.config.vocab_size;
        }
        logits.reshape(out_dims)
    }

    fn ensure_id_range(&self, flat_ids: &Tensor) -> Result<()> {
        let min_id = flat_ids.min_all()?.to_scalar::<i64>()?;
        if min_id < 0 {
            return Err(Error::Msg(format!(
                "encountered negative token id {min_id} (minimum)"
            )));
        }

        let max_id = flat_ids.max_all()?.to_scalar::<i64>()?;
        let vocab = self.config.vocab_size as i64;
        if max_id >= vocab {
            return Err(Error::Msg(format!(
                "token id {max_id} exceeds vocab size {vocab}"
            )));
        }
        Ok(())
    }
}

fn validate_token_ids(token_ids: &Tensor) -> Result<()> {
    if token_ids.elem_count() == 0 {
        return Err(Error::Msg("token_ids must not be empty".into()));
    }
    if !token_ids.dtype().is_int() {
        return Err(Error::Msg(format!(
            "token_ids expected integer dtype but received {:?}",
            token_ids.dtype()
        )));
    }
    Ok(())
}
