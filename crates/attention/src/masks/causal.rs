//! Builders for causal attention masks.
//!
//! The resulting tensors have dtype [`MASK_DTYPE`](super::MASK_DTYPE) and shape
//! `[q_len, k_len]`. Entries are `1.0` where attention is permitted and `0.0`
//! otherwise.

use candle_core::{Device, Result, Tensor};

use super::MASK_DTYPE;

/// Construct a causal mask for the supplied sequence dimensions.
///
/// When `k_len > q_len`, queries are assumed to align with the most recent
/// `q_len` keys, so query `i` sees every key `j <= (k_len - q_len) + i`. This
/// is the shape needed when new positions attend over a carried history.
pub fn build_causal_mask(device: &Device, q_len: usize, k_len: usize) -> Result<Tensor> {
    let offset = k_len.saturating_sub(q_len);
    let mut data = vec![0f32; q_len * k_len];
    for q in 0..q_len {
        let visible = (q + offset + 1).min(k_len);
        let row_start = q * k_len;
        for slot in &mut data[row_start..row_start + visible] {
            *slot = 1.0;
        }
    }
    Tensor::from_vec(data, (q_len, k_len), device)?.to_dtype(MASK_DTYPE)
}

/// Square lower-triangular (inclusive) mask of side `length`.
pub fn causal_mask(length: usize, device: &Device) -> Result<Tensor> {
    build_causal_mask(device, length, length)
}
