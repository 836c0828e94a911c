//! Core traits and types shared across attention implementations.
//!
//! Implementations operate on head-split tensors with layout
//! `[beam * batch, heads, len, head_dim]`; the output has the query's layout.

pub mod config;
pub mod errors;

use candle_core::Tensor;

pub use config::Config;
pub use errors::AttentionError;

use crate::masks::AdditiveMask;

/// Unified interface for attention kernels.
///
/// * `q` is `[rows, heads, q_len, head_dim]`; `k` and `v` are
///   `[rows, heads, k_len, head_dim]`.
/// * Masks are additive and broadcastable to `[rows, heads, q_len, k_len]`,
///   i.e. shaped `[1 | rows, 1 | heads, 1 | q_len, k_len]`.
/// * Every query row must keep at least one key unmasked.
/// * Dropout is controlled via [`Config::dropout_p`].
pub trait Attention {
    /// Compute attention weights over `k` and return the weighted sum of `v`.
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&AdditiveMask>,
        config: &Config,
    ) -> Result<Tensor, AttentionError>;
}
