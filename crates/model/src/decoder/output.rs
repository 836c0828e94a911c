//! Output vocabulary projection.

use candle_core::{DType, Device, Tensor};
use embedding::TokenEmbedding;
use layers::{Linear, LinearConfig};

use crate::error::{ModelError, Result};

#[derive(Debug, Clone)]
enum OutputWeight {
    /// Transposed target embedding table.
    Tied(TokenEmbedding),
    /// Bias-free `(vocab, dim)` projection.
    Untied(Linear),
}

/// Maps decoder outputs to vocabulary logits, optionally restricted to a
/// shortlist of target ids.
#[derive(Debug, Clone)]
pub struct OutputLayer {
    weight: OutputWeight,
    bias: Tensor,
    shortlist: Option<Tensor>,
    vocab: usize,
}

impl OutputLayer {
    /// Output layer sharing its weight with the target embedding table.
    pub fn tied(table: TokenEmbedding) -> Result<Self> {
        let vocab = table.config().vocab_size;
        let bias = Tensor::zeros(vocab, DType::F32, &table.config().device)?;
        Ok(Self {
            weight: OutputWeight::Tied(table),
            bias,
            shortlist: None,
            vocab,
        })
    }

    pub fn untied(dim: usize, vocab: usize, device: &Device) -> Result<Self> {
        let config = LinearConfig {
            input_dim: dim,
            output_dim: vocab,
            bias: false,
        };
        Ok(Self {
            weight: OutputWeight::Untied(Linear::xavier_uniform(config, device)?),
            bias: Tensor::zeros(vocab, DType::F32, device)?,
            shortlist: None,
            vocab,
        })
    }

    /// Restricts the logits to `ids`, in the given order.
    pub fn with_shortlist(mut self, ids: &[u32]) -> Result<Self> {
        if ids.is_empty() {
            return Err(ModelError::Shape("shortlist must not be empty".into()));
        }
        if let Some(bad) = ids.iter().find(|&&id| id as usize >= self.vocab) {
            return Err(ModelError::Shape(format!(
                "shortlist id {bad} exceeds vocabulary {}",
                self.vocab
            )));
        }
        self.shortlist = Some(Tensor::from_slice(ids, ids.len(), self.bias.device())?);
        Ok(self)
    }

    pub fn is_tied(&self) -> bool {
        matches!(self.weight, OutputWeight::Tied(_))
    }

    /// Width of the logits' last axis.
    pub fn output_dim(&self) -> usize {
        match &self.shortlist {
            Some(ids) => ids.dims()[0],
            None => self.vocab,
        }
    }

    /// `(.., dim)` hidden states to `(.., output_dim)` logits.
    pub fn forward(&self, hidden: &Tensor) -> Result<Tensor> {
        let Some(ids) = &self.shortlist else {
            let logits = match &self.weight {
                OutputWeight::Tied(table) => table.linear_out(hidden)?,
                OutputWeight::Untied(linear) => linear.forward(hidden)?,
            };
            return Ok(logits.broadcast_add(&self.bias)?);
        };

        let weight = match &self.weight {
            OutputWeight::Tied(table) => table.weight(),
            OutputWeight::Untied(linear) => linear.weight().clone(),
        };
        let weight = weight.index_select(ids, 0)?;
        let bias = self.bias.index_select(ids, 0)?;

        let dims = hidden.dims().to_vec();
        let dim = dims.last().copied().unwrap_or(0);
        let logits = hidden.reshape(((), dim))?.matmul(&weight.t()?)?.broadcast_add(&bias)?;
        let mut out_dims = dims;
        if let Some(last) = out_dims.last_mut() {
            *last = ids.dims()[0];
        }
        Ok(logits.reshape(out_dims)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedding::TokenEmbeddingConfig;

    #[test]
    fn shortlist_selects_vocabulary_columns() -> Result<()> {
        let device = Device::Cpu;
        let table = TokenEmbedding::new(TokenEmbeddingConfig {
            vocab_size: 7,
            hidden_dim: 4,
            device: device.clone(),
        })?;
        let full = OutputLayer::tied(table.clone())?;
        let short = OutputLayer::tied(table)?.with_shortlist(&[5, 1])?;
        assert_eq!(short.output_dim(), 2);

        let hidden = Tensor::randn(0f32, 1.0, (1, 2, 3, 4), &device)?;
        let all = full.forward(&hidden)?;
        let some = short.forward(&hidden)?;
        assert_eq!(some.dims(), &[1, 2, 3, 2]);
        let expected = Tensor::cat(&[&all.narrow(3, 5, 1)?, &all.narrow(3, 1, 1)?], 3)?;
        let diff = some.sub(&expected)?.abs()?.max_all()?.to_vec0::<f32>()?;
        assert!(diff < 1e-5);
        Ok(())
    }

    #[test]
    fn untied_layer_produces_vocabulary_logits() -> Result<()> {
        let device = Device::Cpu;
        let layer = OutputLayer::untied(4, 9, &device)?;
        assert!(!layer.is_tied());
        let logits = layer.forward(&Tensor::ones((2, 1, 1, 4), DType::F32, &device)?)?;
        assert_eq!(logits.dims(), &[2, 1, 1, 9]);
        assert!(layer.with_shortlist(&[9]).is_err());
        Ok(())
    }
}
