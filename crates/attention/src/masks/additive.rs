//! Conversion of multiplicative masks into the additive (log-domain) form.
//!
//! An [`AdditiveMask`] can only be produced by [`to_additive_mask`], so a
//! value that is already additive cannot be converted a second time. Its
//! tensor is laid out `[rows, 1, q_len | 1, k_len]`, ready to broadcast over
//! the head axis of attention scores.

use candle_core::{Error, Result, Tensor};

use super::MASK_DTYPE;

/// Value added to the scores of masked positions.
pub const MASK_FILL: f64 = -99_999_999.0;

/// Additive attention mask: `0.0` keeps a key, [`MASK_FILL`] removes it.
#[derive(Debug, Clone)]
pub struct AdditiveMask {
    tensor: Tensor,
}

impl AdditiveMask {
    /// The underlying `[rows, 1, q_len | 1, k_len]` tensor.
    pub fn as_tensor(&self) -> &Tensor {
        &self.tensor
    }

    /// Number of flattened `(beam, batch)` rows the mask covers.
    pub fn rows(&self) -> usize {
        self.tensor.dims()[0]
    }

    /// Tiles the mask beam-major for `beam` hypotheses per batch entry.
    ///
    /// Row `b * rows + i` of the result equals row `i` of `self`, matching
    /// the flattening of a `(beam, batch, ..)` tensor.
    pub fn repeat_beams(&self, beam: usize) -> Result<Self> {
        if beam <= 1 {
            return Ok(self.clone());
        }
        Ok(Self {
            tensor: self.tensor.repeat((beam, 1, 1, 1))?,
        })
    }
}

/// Converts a multiplicative 0/1 mask into `(1 - mask) * -K`.
///
/// Accepted layouts and their additive counterparts:
///
/// | input                    | output                       |
/// |--------------------------|------------------------------|
/// | `[batch, k_len]`         | `[batch, 1, 1, k_len]`       |
/// | `[batch, q_len, k_len]`  | `[batch, 1, q_len, k_len]`   |
/// | `[beam, batch, q, k]`    | `[beam * batch, 1, q, k]`    |
pub fn to_additive_mask(mask: &Tensor) -> Result<AdditiveMask> {
    let dims = mask.dims();
    let shape = match *dims {
        [batch, k_len] => (batch, 1, 1, k_len),
        [batch, q_len, k_len] => (batch, 1, q_len, k_len),
        [beam, batch, q_len, k_len] => (beam * batch, 1, q_len, k_len),
        _ => {
            return Err(Error::Msg(format!(
                "mask must have rank 2, 3 or 4, got shape {dims:?}"
            )))
        }
    };
    let additive = mask
        .to_dtype(MASK_DTYPE)?
        .affine(-MASK_FILL, MASK_FILL)?
        .reshape(shape)?;
    Ok(AdditiveMask { tensor: additive })
}
