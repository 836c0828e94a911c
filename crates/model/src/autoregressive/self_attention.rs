//! Causal self-attention over the decoded history.

use attention::masks::{build_causal_mask, combine_masks, to_additive_mask, AdditiveMask, MASK_DTYPE};
use candle_core::{Device, Tensor};

use crate::error::{ModelError, Result};
use crate::sublayer::AttentionSublayer;

/// Self-attention whose keys and values are the raw layer inputs of every
/// position decoded so far.
#[derive(Debug, Clone)]
pub struct SelfAttentionLayer {
    sublayer: AttentionSublayer,
}

impl SelfAttentionLayer {
    pub fn new(sublayer: AttentionSublayer) -> Self {
        Self { sublayer }
    }

    /// Returns the layer output and the extended history.
    ///
    /// `history` is `(beam, batch, h, dim)` and `input` is
    /// `(beam, batch, q, dim)`; the returned history covers `h + q` positions.
    pub fn forward(
        &self,
        input: &Tensor,
        history: Option<&Tensor>,
        target_mask: Option<&Tensor>,
    ) -> Result<(Tensor, Tensor)> {
        let (beam, batch, q_len, dim) = input.dims4()?;
        let values = match history {
            Some(history) => {
                let (h_beam, h_batch, _, h_dim) = history.dims4()?;
                if (h_beam, h_batch, h_dim) != (beam, batch, dim) {
                    return Err(ModelError::Shape(format!(
                        "history {:?} does not line up with input {:?}",
                        history.dims(),
                        input.dims()
                    )));
                }
                Tensor::cat(&[history, input], 2)?
            }
            None => input.clone(),
        };
        let history_len = values.dims()[2] - q_len;

        let mask = self_attention_mask(q_len, history_len, target_mask, input.device())?;
        let output = self.sublayer.forward(input, &values, &values, Some(&mask))?;
        Ok((output, values))
    }
}

/// Causal mask for `q_len` new positions following `history_len` earlier
/// ones, optionally combined with a target padding mask.
///
/// `target_mask` is `(batch, q_len)` or `(beam, batch, q_len)`; history
/// positions always count as valid.
pub fn self_attention_mask(
    q_len: usize,
    history_len: usize,
    target_mask: Option<&Tensor>,
    device: &Device,
) -> Result<AdditiveMask> {
    let k_len = history_len + q_len;
    let causal = build_causal_mask(device, q_len, k_len)?;
    let Some(target_mask) = target_mask else {
        return Ok(to_additive_mask(&causal.unsqueeze(0)?)?);
    };

    let target_mask = match *target_mask.dims() {
        [_, len] if len == q_len => target_mask.clone(),
        [beam, batch, len] if len == q_len => target_mask.reshape((beam * batch, len))?,
        _ => {
            return Err(ModelError::Shape(format!(
                "target mask {:?} does not cover {q_len} positions",
                target_mask.dims()
            )))
        }
    };
    let target_mask = target_mask.to_dtype(MASK_DTYPE)?;
    let rows = target_mask.dims()[0];
    let keys = if history_len > 0 {
        let seen = Tensor::ones((rows, history_len), MASK_DTYPE, device)?;
        Tensor::cat(&[&seen, &target_mask], 1)?
    } else {
        target_mask
    };
    let combined = combine_masks(&causal.unsqueeze(0)?, &keys.unsqueeze(1)?)?;
    Ok(to_additive_mask(&combined)?)
}
