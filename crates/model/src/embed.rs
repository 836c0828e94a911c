//! Token lookup, word dropout, scaling and positions shared by both stacks.

use candle_core::Tensor;
use embedding::{add_positional_encoding, TokenEmbedding};
use layers::{Dropout, PreProcess};

use crate::error::{ModelError, Result};
use crate::sublayer::SublayerBuilder;

/// Embedding table followed by `√dim` scaling, sinusoidal positions and the
/// embedding post-process.
#[derive(Debug, Clone)]
pub struct ScaledEmbedding {
    table: TokenEmbedding,
    word_dropout: Dropout,
    process: PreProcess,
    scale: f64,
}

impl ScaledEmbedding {
    pub(crate) fn build(builder: &SublayerBuilder<'_>, table: TokenEmbedding, word_dropout: f32) -> Result<Self> {
        let dim = table.config().hidden_dim;
        if dim != builder.config.dim_emb {
            return Err(ModelError::Shape(format!(
                "embedding width {dim} differs from dim_emb {}",
                builder.config.dim_emb
            )));
        }
        Ok(Self {
            word_dropout: builder.dropout(word_dropout),
            process: builder.pre_process(&builder.options.postprocess_emb)?,
            scale: (dim as f64).sqrt(),
            table,
        })
    }

    pub fn table(&self) -> &TokenEmbedding {
        &self.table
    }

    /// Looks up `(beam, batch, len)` ids and drops whole positions.
    pub fn lookup(&self, ids: &Tensor) -> Result<Tensor> {
        let (_, _, len) = ids.dims3()?;
        let embedded = self.table.forward(ids)?;
        Ok(self.word_dropout.forward_with_noise_shape(&embedded, &[1, 1, len, 1])?)
    }

    /// Scales `(beam, batch, len, dim)` embeddings and adds positions from `start`.
    pub fn encode_positions(&self, embeddings: &Tensor, start: usize) -> Result<Tensor> {
        let scaled = embeddings.affine(self.scale, 0.0)?;
        let positioned = add_positional_encoding(&scaled, start)?;
        Ok(self.process.forward(&positioned)?)
    }
}
