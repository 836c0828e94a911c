use std::sync::atomic::{AtomicU64, Ordering};

use attention::{AttentionCache, CacheStats};

use super::state::DecoderState;
use crate::error::{ModelError, Result};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Owns the cross-attention cache of one decode run.
///
/// Every [`DecoderState`] records the id of the session that created it;
/// stepping a state through a different session is rejected because the
/// cached projections would belong to another encoder context.
#[derive(Debug)]
pub struct DecodeSession {
    id: u64,
    cache: AttentionCache,
}

impl DecodeSession {
    pub(crate) fn new(layers: usize, encoders: usize) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!("decode session {id} opened over {layers} layers and {encoders} encoders");
        Self {
            id,
            cache: AttentionCache::for_layers(layers, encoders),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cache(&self) -> &AttentionCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub(crate) fn cache_mut(&mut self) -> &mut AttentionCache {
        &mut self.cache
    }

    pub(crate) fn check(&self, state: &DecoderState) -> Result<()> {
        if state.session_id() != self.id {
            return Err(ModelError::SessionMismatch {
                state: state.session_id(),
                session: self.id,
            });
        }
        Ok(())
    }
}
