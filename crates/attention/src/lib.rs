//! Attention primitives for the translation transformer.
//!
//! The crate covers mask construction (causal, padding, additive
//! conversion), head splitting, the scaled dot-product kernel, the
//! multi-head block and the per-session cache of projected keys/values used
//! by cross-attention during incremental decoding.
//!
//! Tensors follow a 4-axis layout `[beam, batch, len, features]`. Inside the
//! kernel, beam and batch are flattened beam-major and heads are split out:
//! `[beam * batch, heads, len, head_dim]`.
//!
//! Dropout is an optional, train-only concern controlled via [`Config`].

pub mod core;
pub mod heads;
pub mod kv_cache;
pub mod masks;
pub mod multihead;
pub mod reference;

pub use self::core::{Attention, AttentionError, Config};
pub use kv_cache::{AttentionCache, CacheKey, CacheStats, CachedProjection};
pub use masks::{to_additive_mask, AdditiveMask};
pub use multihead::{MultiHeadAttention, MultiHeadConfig};
