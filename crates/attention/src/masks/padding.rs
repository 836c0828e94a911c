//! Builders for padding masks used to drop padded keys.
//!
//! Padding masks are multiplicative, shaped `[batch, k_len]`, with dtype
//! [`MASK_DTYPE`](super::MASK_DTYPE).

use candle_core::{Device, Result, Tensor};

use super::MASK_DTYPE;

/// Construct padding masks from per-batch valid key lengths.
pub fn padding_mask_from_lengths(device: &Device, key_lengths: &[usize], k_len: usize) -> Result<Tensor> {
    let batch = key_lengths.len();
    let mut data = vec![0f32; batch * k_len];
    for (b, &valid) in key_lengths.iter().enumerate() {
        let valid = valid.min(k_len);
        for slot in &mut data[b * k_len..b * k_len + valid] {
            *slot = 1.0;
        }
    }
    Tensor::from_vec(data, (batch, k_len), device)?.to_dtype(MASK_DTYPE)
}
