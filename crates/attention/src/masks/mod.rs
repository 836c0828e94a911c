//! Mask utilities shared by attention implementations.
//!
//! Builders in [`causal`] and [`padding`] produce multiplicative masks: `f32`
//! tensors holding `1.0` where attention is permitted and `0.0` otherwise.
//! Multiplicative masks compose by elementwise multiplication. Immediately
//! before attention they are converted once into an [`AdditiveMask`], which
//! holds `0.0` or a large negative constant and is added to raw scores.

pub mod additive;
pub mod causal;
pub mod padding;

use candle_core::{DType, Result, Tensor};

/// Dtype shared by all masks.
pub const MASK_DTYPE: DType = DType::F32;

pub use additive::{to_additive_mask, AdditiveMask, MASK_FILL};
pub use causal::{build_causal_mask, causal_mask};
pub use padding::padding_mask_from_lengths;

/// Combines two multiplicative masks; a position survives only if both keep it.
pub fn combine_masks(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    a.broadcast_mul(b)
}
