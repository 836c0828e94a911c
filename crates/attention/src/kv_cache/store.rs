//! Bounded, write-once projection cache.

use std::collections::HashMap;

use crate::core::AttentionError;
use crate::kv_cache::api::{CacheKey, CacheStats, CachedProjection};

/// Write-once map from [`CacheKey`] to projected keys/values.
///
/// Capacity is fixed at construction (`layers * encoders` for a decoder); a
/// session that structures its keys correctly never exceeds it.
#[derive(Debug, Clone)]
pub struct AttentionCache {
    capacity: usize,
    entries: HashMap<CacheKey, CachedProjection>,
    hits: usize,
    misses: usize,
}

impl AttentionCache {
    pub fn new(capacity: usize) -> Self {
        log::info!("attention cache init: capacity={capacity}");
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Cache sized for `layers` cacheable layers over `encoders` contexts.
    pub fn for_layers(layers: usize, encoders: usize) -> Self {
        Self::new(layers * encoders)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cached projection for `key`, computing and storing it on
    /// the first request.
    pub fn get_or_insert_with<F>(&mut self, key: CacheKey, project: F) -> Result<CachedProjection, AttentionError>
    where
        F: FnOnce() -> Result<CachedProjection, AttentionError>,
    {
        if let Some(hit) = self.lookup(key) {
            return Ok(hit);
        }
        let projection = project()?;
        self.store(key, projection.clone())?;
        Ok(projection)
    }

    /// Returns the projection stored under `key`, if any.
    pub fn lookup(&mut self, key: CacheKey) -> Option<CachedProjection> {
        match self.entries.get(&key) {
            Some(projection) => {
                self.hits += 1;
                log::trace!("attention cache hit layer={} encoder={}", key.layer, key.encoder);
                Some(projection.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Stores a projection; each key may be written once.
    pub fn store(&mut self, key: CacheKey, projection: CachedProjection) -> Result<(), AttentionError> {
        if self.entries.contains_key(&key) {
            return Err(AttentionError::Cache {
                context: format!(
                    "entry for layer {} encoder {} is already populated",
                    key.layer, key.encoder
                ),
            });
        }
        if self.entries.len() >= self.capacity {
            return Err(AttentionError::Cache {
                context: format!("capacity {} exhausted", self.capacity),
            });
        }
        log::debug!(
            "attention cache populated layer={} encoder={} keys={:?}",
            key.layer,
            key.encoder,
            projection.keys.dims()
        );
        self.entries.insert(key, projection);
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
        }
    }
}
