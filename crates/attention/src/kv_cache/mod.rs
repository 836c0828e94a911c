//! Per-session cache of projected attention keys and values.
//!
//! Cross-attention attends over an encoder context that never changes during
//! a decode session, so its key/value projections are computed on the first
//! step and reused afterwards.

pub mod api;
pub mod store;

pub use api::{CacheKey, CacheStats, CachedProjection};
pub use store::AttentionCache;

#[cfg(test)]
mod tests;
