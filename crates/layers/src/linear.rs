//! Linear and affine projection helpers.
//!
//! Linear layers accept inputs of any rank whose trailing axis is
//! `input_dim` (typically `(beam, batch, length, input_dim)`) and return the
//! same leading axes with `output_dim` features. Leading axes are flattened
//! into rows for a single matmul and restored afterwards. Weights are stored
//! as `(output_dim, input_dim)`; initialisation follows the Glorot recipes
//! used for transformer projections.

use candle_core::{DType, Device, Error, Result, Tensor};

use crate::checks;

/// Configuration shared by dense projection layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConfig {
    /// Incoming feature dimension.
    pub input_dim: usize,
    /// Output feature dimension.
    pub output_dim: usize,
    /// Whether a learnable bias vector should be applied.
    pub bias: bool,
}

impl LinearConfig {
    /// Creates a configuration for a biased projection layer.
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            bias: true,
        }
    }
}

/// Dense affine projection with optional bias.
#[derive(Debug, Clone)]
pub struct Linear {
    config: LinearConfig,
    weight: Tensor,
    bias: Option<Tensor>,
}

impl Linear {
    /// Constructs a linear layer from pre-existing parameters.
    pub fn new(config: LinearConfig, weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        checks::expect_shape("linear.weight", &weight, &[config.output_dim, config.input_dim])?;
        match (config.bias, bias.as_ref()) {
            (true, Some(tensor)) => checks::expect_shape("linear.bias", tensor, &[config.output_dim])?,
            (false, Some(_)) => return Err(Error::Msg("bias provided but config disables bias".into())),
            (true, None) => return Err(Error::Msg("config expects bias but none supplied".into())),
            (false, None) => {}
        }
        Ok(Self {
            config,
            weight,
            bias,
        })
    }

    /// Builds a Xavier/Glorot uniform initialised layer with a zero bias.
    pub fn xavier_uniform(config: LinearConfig, device: &Device) -> Result<Self> {
        let (fan_in, fan_out) = (config.input_dim as f64, config.output_dim as f64);
        let bound = (6.0f64 / (fan_in + fan_out)).sqrt() as f32;
        let weight = Tensor::rand(-bound, bound, (config.output_dim, config.input_dim), device)?;
        let bias = if config.bias {
            Some(Tensor::zeros(config.output_dim, DType::F32, device)?)
        } else {
            None
        };
        Self::new(config, weight, bias)
    }

    /// Returns the static configuration.
    pub fn config(&self) -> &LinearConfig {
        &self.config
    }

    /// Weight matrix shaped `(output_dim, input_dim)`.
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Bias vector shaped `(output_dim,)`, if any.
    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    /// Applies `x W^T + b` over the trailing axis.
    pub fn forward(&self, hidden: &Tensor) -> Result<Tensor> {
        checks::expect_last_dim("linear.input", hidden, self.config.input_dim)?;
        let dims = hidden.dims();
        let rows: usize = dims[..dims.len() - 1].iter().product();

        let flat = hidden.reshape((rows, self.config.input_dim))?;
        let mut output = flat.matmul(&self.weight.t()?)?;
        if let Some(bias) = &self.bias {
            output = output.broadcast_add(bias)?;
        }

        let mut out_dims = dims.to_vec();
        if let Some(last) = out_dims.last_mut() {
            *last = self.config.output_dim;
        }
        output.reshape(out_dims)
    }
}
