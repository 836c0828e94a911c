//! Multi-head attention block with optional projection caching.
//!
//! Queries are `[beam, batch, q_len, model_dim]`; key and value sources are
//! `[beam | 1, batch, k_len, kv_dim]`. A source with a single beam (an
//! encoder context) is tiled beam-major to match the query after projection,
//! so cached projections stay independent of the beam size.

use candle_core::{Device, Tensor};
use layers::linear::{Linear, LinearConfig};

use crate::core::{Attention, AttentionError, Config};
use crate::heads::{join_heads, split_heads};
use crate::kv_cache::{AttentionCache, CacheKey, CachedProjection};
use crate::masks::AdditiveMask;
use crate::reference::ExactAttention;

/// Static description of a multi-head attention block.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiHeadConfig {
    /// Width of the query input and of the block output.
    pub model_dim: usize,
    /// Width of the key/value sources.
    pub kv_dim: usize,
    /// Total width of the projected heads.
    pub attention_dim: usize,
    pub heads: usize,
    /// Skip the output projection when `attention_dim == model_dim`.
    pub no_projection: bool,
    /// Dropout on attention weights.
    pub dropout_p: f32,
}

impl MultiHeadConfig {
    pub fn new(model_dim: usize, heads: usize) -> Self {
        Self {
            model_dim,
            kv_dim: model_dim,
            attention_dim: model_dim,
            heads,
            no_projection: false,
            dropout_p: 0.0,
        }
    }

    pub fn with_kv_dim(mut self, kv_dim: usize) -> Self {
        self.kv_dim = kv_dim;
        self
    }

    /// Whether the block owns an output projection.
    pub fn projects_output(&self) -> bool {
        !self.no_projection || self.attention_dim != self.model_dim
    }
}

/// Projections, kernel and configuration of one attention block.
#[derive(Debug, Clone)]
pub struct MultiHeadAttention {
    config: MultiHeadConfig,
    query: Linear,
    key: Linear,
    value: Linear,
    output: Option<Linear>,
    kernel: ExactAttention,
    attention: Config,
}

impl MultiHeadAttention {
    pub fn new(config: MultiHeadConfig, device: &Device) -> Result<Self, AttentionError> {
        if config.heads == 0 || config.attention_dim % config.heads != 0 {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "attention width {} is not divisible into {} heads",
                    config.attention_dim, config.heads
                ),
            });
        }
        let query = Linear::xavier_uniform(LinearConfig::new(config.model_dim, config.attention_dim), device)?;
        let key = Linear::xavier_uniform(LinearConfig::new(config.kv_dim, config.attention_dim), device)?;
        let value = Linear::xavier_uniform(LinearConfig::new(config.kv_dim, config.attention_dim), device)?;
        let output = if config.projects_output() {
            Some(Linear::xavier_uniform(
                LinearConfig::new(config.attention_dim, config.model_dim),
                device,
            )?)
        } else {
            None
        };

        Ok(Self {
            attention: Config::with_dropout(config.dropout_p),
            config,
            query,
            key,
            value,
            output,
            kernel: ExactAttention::new(),
        })
    }

    pub fn config(&self) -> &MultiHeadConfig {
        &self.config
    }

    /// Projects key and value sources into attention space.
    pub fn project_memory(&self, keys: &Tensor, values: &Tensor) -> Result<CachedProjection, AttentionError> {
        Ok(CachedProjection {
            keys: self.key.forward(keys)?,
            values: self.value.forward(values)?,
        })
    }

    /// Attends from `query` over freshly projected `keys`/`values`.
    pub fn forward(
        &self,
        query: &Tensor,
        keys: &Tensor,
        values: &Tensor,
        mask: Option<&AdditiveMask>,
    ) -> Result<Tensor, AttentionError> {
        let memory = self.project_memory(keys, values)?;
        self.attend_projected(query, &memory, mask)
    }

    /// Like [`forward`](Self::forward) but reuses the projection stored under
    /// `key`, projecting and storing it on first use.
    pub fn forward_cached(
        &self,
        query: &Tensor,
        keys: &Tensor,
        values: &Tensor,
        mask: Option<&AdditiveMask>,
        cache: &mut AttentionCache,
        key: CacheKey,
    ) -> Result<Tensor, AttentionError> {
        let memory = cache.get_or_insert_with(key, || self.project_memory(keys, values))?;
        self.attend_projected(query, &memory, mask)
    }

    fn attend_projected(
        &self,
        query: &Tensor,
        memory: &CachedProjection,
        mask: Option<&AdditiveMask>,
    ) -> Result<Tensor, AttentionError> {
        let (beam, batch, _, _) = query.dims4().map_err(|_| AttentionError::InvalidShape {
            context: format!("query must be [beam, batch, len, features], got {:?}", query.dims()),
        })?;
        let (memory_beam, memory_batch, _, _) = memory.keys.dims4()?;
        if memory_batch != batch {
            return Err(AttentionError::InvalidShape {
                context: format!("query batch {batch} does not match key batch {memory_batch}"),
            });
        }

        let (keys, values) = if memory_beam == beam {
            (memory.keys.clone(), memory.values.clone())
        } else if memory_beam == 1 {
            (
                memory.keys.repeat((beam, 1, 1, 1))?,
                memory.values.repeat((beam, 1, 1, 1))?,
            )
        } else {
            return Err(AttentionError::InvalidShape {
                context: format!("key beam {memory_beam} cannot be aligned with query beam {beam}"),
            });
        };

        let mask = match mask {
            Some(mask) if mask.rows() == batch && beam > 1 => Some(mask.repeat_beams(beam)?),
            Some(mask) => Some(mask.clone()),
            None => None,
        };

        let heads = self.config.heads;
        let q = split_heads(&self.query.forward(query)?, heads)?;
        let k = split_heads(&keys, heads)?;
        let v = split_heads(&values, heads)?;

        let context = self.kernel.attend(&q, &k, &v, mask.as_ref(), &self.attention)?;
        let joined = join_heads(&context, beam)?;
        match &self.output {
            Some(output) => Ok(output.forward(&joined)?),
            None => Ok(joined),
        }
    }
}
