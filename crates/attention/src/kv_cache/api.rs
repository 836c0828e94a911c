//! Public types describing projection cache behaviour.

use candle_core::Tensor;

/// Identity of a cacheable attention block: parameter layer and encoder index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub layer: usize,
    pub encoder: usize,
}

impl CacheKey {
    pub fn new(layer: usize, encoder: usize) -> Self {
        Self { layer, encoder }
    }
}

/// Projected keys and values, each `[beam, batch, len, attention_dim]`.
#[derive(Debug, Clone)]
pub struct CachedProjection {
    pub keys: Tensor,
    pub values: Tensor,
}

/// Counters describing cache occupancy and reuse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: usize,
    pub misses: usize,
}
