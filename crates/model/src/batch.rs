//! Padded source batches.

use attention::masks::padding_mask_from_lengths;
use candle_core::{Device, Tensor};

use crate::error::{ModelError, Result};

/// Token ids padded with `0` to the longest sentence, plus the 0/1 mask.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    ids: Tensor,
    mask: Tensor,
    lengths: Vec<usize>,
}

impl SourceBatch {
    /// Pads `sentences` into a `(batch, max_len)` id tensor and mask.
    pub fn from_sentences(sentences: &[Vec<u32>], device: &Device) -> Result<Self> {
        if sentences.is_empty() {
            return Err(ModelError::Shape("source batch must contain a sentence".into()));
        }
        if let Some(index) = sentences.iter().position(Vec::is_empty) {
            return Err(ModelError::Shape(format!("sentence {index} is empty")));
        }

        let lengths: Vec<usize> = sentences.iter().map(Vec::len).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(0);
        let mut ids = vec![0u32; sentences.len() * max_len];
        for (row, sentence) in sentences.iter().enumerate() {
            let offset = row * max_len;
            ids[offset..offset + sentence.len()].copy_from_slice(sentence);
        }

        Ok(Self {
            ids: Tensor::from_vec(ids, (sentences.len(), max_len), device)?,
            mask: padding_mask_from_lengths(device, &lengths, max_len)?,
            lengths,
        })
    }

    /// Token ids shaped `(batch, len)`.
    pub fn ids(&self) -> &Tensor {
        &self.ids
    }

    /// Multiplicative mask shaped `(batch, len)`.
    pub fn mask(&self) -> &Tensor {
        &self.mask
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    pub fn max_len(&self) -> usize {
        self.ids.dims()[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_longest_sentence() -> Result<()> {
        let batch = SourceBatch::from_sentences(&[vec![4, 5, 6], vec![7, 8, 9, 10, 11]], &Device::Cpu)?;
        assert_eq!(batch.batch_size(), 2);
        assert_eq!(batch.max_len(), 5);
        assert_eq!(batch.ids().to_vec2::<u32>()?[0], vec![4, 5, 6, 0, 0]);
        let mask = batch.mask().to_vec2::<f32>()?;
        assert_eq!(mask[0], vec![1.0, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(mask[1], vec![1.0; 5]);
        assert_eq!(batch.lengths(), &[3, 5]);
        Ok(())
    }

    #[test]
    fn empty_sentences_are_rejected() {
        assert!(SourceBatch::from_sentences(&[], &Device::Cpu).is_err());
        assert!(SourceBatch::from_sentences(&[vec![1], vec![]], &Device::Cpu).is_err());
    }
}
