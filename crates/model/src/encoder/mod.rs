//! Source encoders and the context they hand to the decoder.

pub mod recurrent;
pub mod transformer;

use std::fmt;

use attention::{to_additive_mask, AdditiveMask};
use candle_core::Tensor;

pub use recurrent::BiGruEncoder;
pub use transformer::TransformerEncoder;

use crate::batch::SourceBatch;
use crate::error::{ModelError, Result};

/// Encoded source batch: a `(1, batch, len, dim)` context and the
/// `(batch, len)` multiplicative padding mask it was computed under.
#[derive(Debug, Clone)]
pub struct EncoderState {
    context: Tensor,
    mask: Tensor,
}

impl EncoderState {
    pub fn new(context: Tensor, mask: Tensor) -> Result<Self> {
        let (beam, batch, len, _) = context.dims4()?;
        let (mask_batch, mask_len) = mask.dims2()?;
        if beam != 1 || (mask_batch, mask_len) != (batch, len) {
            return Err(ModelError::Shape(format!(
                "encoder context {:?} does not match mask {:?}",
                context.dims(),
                mask.dims()
            )));
        }
        Ok(Self { context, mask })
    }

    pub fn context(&self) -> &Tensor {
        &self.context
    }

    pub fn mask(&self) -> &Tensor {
        &self.mask
    }

    pub fn batch_size(&self) -> usize {
        self.context.dims()[1]
    }

    pub fn len(&self) -> usize {
        self.context.dims()[2]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Feature width of the context.
    pub fn dim(&self) -> usize {
        self.context.dims()[3]
    }

    /// Number of unmasked positions per batch entry.
    pub fn valid_positions(&self) -> Result<Vec<usize>> {
        let counts = self.mask.sum(1)?.to_vec1::<f32>()?;
        Ok(counts.into_iter().map(|count| count.round() as usize).collect())
    }

    /// Additive form of the padding mask, `(batch, 1, 1, len)`.
    pub fn additive_mask(&self) -> Result<AdditiveMask> {
        Ok(to_additive_mask(&self.mask)?)
    }
}

/// Anything that turns a padded source batch into an [`EncoderState`].
pub trait Encoder: fmt::Debug {
    fn encode(&self, batch: &SourceBatch) -> Result<EncoderState>;

    /// Feature width of the produced context.
    fn context_dim(&self) -> usize;
}
