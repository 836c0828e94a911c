//! Transformer encoder stack.

use embedding::TokenEmbedding;

use super::{Encoder, EncoderState};
use crate::batch::SourceBatch;
use crate::embed::ScaledEmbedding;
use crate::error::Result;
use crate::sublayer::{AttentionSublayer, FeedForwardSublayer, SublayerBuilder};

#[derive(Debug, Clone)]
struct EncoderLayer {
    self_attention: AttentionSublayer,
    ffn: FeedForwardSublayer,
}

/// `enc_depth` layers of (padding-masked self-attention, feed-forward) over
/// scaled, position-encoded embeddings.
#[derive(Debug, Clone)]
pub struct TransformerEncoder {
    embedding: ScaledEmbedding,
    layers: Vec<EncoderLayer>,
    dim: usize,
}

impl TransformerEncoder {
    pub(crate) fn build(builder: &SublayerBuilder<'_>, table: TokenEmbedding) -> Result<Self> {
        let config = builder.config;
        let embedding = ScaledEmbedding::build(builder, table, config.dropout_src)?;
        let layers = (0..config.enc_depth)
            .map(|_| -> Result<EncoderLayer> {
                Ok(EncoderLayer {
                    self_attention: builder.attention(config.dim_emb)?,
                    ffn: builder.feed_forward()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            embedding,
            layers,
            dim: config.dim_emb,
        })
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn embedding(&self) -> &ScaledEmbedding {
        &self.embedding
    }
}

impl Encoder for TransformerEncoder {
    fn encode(&self, batch: &SourceBatch) -> Result<EncoderState> {
        let ids = batch.ids().unsqueeze(0)?;
        let embedded = self.embedding.lookup(&ids)?;
        let mut hidden = self.embedding.encode_positions(&embedded, 0)?;

        let state_mask = batch.mask().clone();
        let mask = attention::to_additive_mask(&state_mask)?;
        for layer in &self.layers {
            hidden = layer.self_attention.forward(&hidden, &hidden, &hidden, Some(&mask))?;
            hidden = layer.ffn.forward(&hidden)?;
        }
        log::trace!(
            "encoded batch of {} sentences, max length {}",
            batch.batch_size(),
            batch.max_len()
        );
        EncoderState::new(hidden, state_mask)
    }

    fn context_dim(&self) -> usize {
        self.dim
    }
}
