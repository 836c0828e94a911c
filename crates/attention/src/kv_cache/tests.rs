use super::{AttentionCache, CacheKey, CacheStats, CachedProjection};
use crate::core::AttentionError;
use candle_core::{Device, Tensor};

fn projection(value: f32) -> CachedProjection {
    let device = Device::Cpu;
    CachedProjection {
        keys: Tensor::full(value, (1, 2, 3, 4), &device).unwrap(),
        values: Tensor::full(value, (1, 2, 3, 4), &device).unwrap(),
    }
}

fn first_value(projection: &CachedProjection) -> f32 {
    projection
        .keys
        .flatten_all()
        .unwrap()
        .to_vec1::<f32>()
        .unwrap()[0]
}

#[test]
fn projections_are_computed_once_per_key() {
    let mut cache = AttentionCache::for_layers(2, 1);
    let key = CacheKey::new(0, 0);
    let mut calls = 0;

    for _ in 0..3 {
        let cached = cache
            .get_or_insert_with(key, || {
                calls += 1;
                Ok(projection(1.0))
            })
            .unwrap();
        assert_eq!(first_value(&cached), 1.0);
    }

    assert_eq!(calls, 1);
    assert_eq!(
        cache.stats(),
        CacheStats {
            entries: 1,
            capacity: 2,
            hits: 2,
            misses: 1
        }
    );
}

#[test]
fn entries_are_write_once() {
    let mut cache = AttentionCache::new(4);
    let key = CacheKey::new(1, 0);
    cache.store(key, projection(1.0)).unwrap();

    let err = cache.store(key, projection(2.0)).unwrap_err();
    assert!(matches!(err, AttentionError::Cache { .. }));
    assert_eq!(first_value(&cache.lookup(key).unwrap()), 1.0);
}

#[test]
fn capacity_is_enforced() {
    let mut cache = AttentionCache::for_layers(1, 2);
    cache.store(CacheKey::new(0, 0), projection(0.0)).unwrap();
    cache.store(CacheKey::new(0, 1), projection(0.0)).unwrap();
    assert!(cache.store(CacheKey::new(1, 0), projection(0.0)).is_err());
    assert_eq!(cache.len(), 2);
}

#[test]
fn distinct_encoders_do_not_collide() {
    let mut cache = AttentionCache::for_layers(1, 2);
    cache.store(CacheKey::new(0, 0), projection(1.0)).unwrap();
    cache.store(CacheKey::new(0, 1), projection(2.0)).unwrap();
    assert_eq!(first_value(&cache.lookup(CacheKey::new(0, 0)).unwrap()), 1.0);
    assert_eq!(first_value(&cache.lookup(CacheKey::new(0, 1)).unwrap()), 2.0);
}

#[test]
fn failed_projection_leaves_cache_empty() {
    let mut cache = AttentionCache::new(1);
    let result = cache.get_or_insert_with(CacheKey::new(0, 0), || {
        Err(AttentionError::Backend {
            message: "boom".to_string(),
        })
    });
    assert!(result.is_err());
    assert!(cache.is_empty());
}
