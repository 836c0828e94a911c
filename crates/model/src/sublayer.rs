//! Sublayers wrapped in pre/post-processing, and the builder that wires
//! configuration, dropout and devices into them.

use attention::{AdditiveMask, AttentionCache, CacheKey, MultiHeadAttention, MultiHeadConfig};
use candle_core::{Device, Tensor};
use layers::{FeedForward, FeedForwardConfig, PostProcess, PreProcess, ProcessSequence};

use crate::config::{ResolvedOptions, TransformerConfig};
use crate::error::Result;

/// Pre-processing of a sublayer input and post-processing of its output.
#[derive(Debug, Clone)]
pub struct ProcessPair {
    pub pre: PreProcess,
    pub post: PostProcess,
}

/// Multi-head attention wrapped in pre/post-processing.
///
/// Pre-processing applies to the query only; keys and values are attended
/// exactly as given.
#[derive(Debug, Clone)]
pub struct AttentionSublayer {
    process: ProcessPair,
    attention: MultiHeadAttention,
}

impl AttentionSublayer {
    pub fn forward(
        &self,
        input: &Tensor,
        keys: &Tensor,
        values: &Tensor,
        mask: Option<&AdditiveMask>,
    ) -> Result<Tensor> {
        let query = self.process.pre.forward(input)?;
        let output = self.attention.forward(&query, keys, values, mask)?;
        Ok(self.process.post.forward(&output, input)?)
    }

    /// Attends over a fixed memory whose projection is cached under `key`.
    pub fn forward_cached(
        &self,
        input: &Tensor,
        memory: &Tensor,
        mask: Option<&AdditiveMask>,
        cache: &mut AttentionCache,
        key: CacheKey,
    ) -> Result<Tensor> {
        let query = self.process.pre.forward(input)?;
        let output = self
            .attention
            .forward_cached(&query, memory, memory, mask, cache, key)?;
        Ok(self.process.post.forward(&output, input)?)
    }
}

/// Position-wise feed-forward stack wrapped in pre/post-processing.
#[derive(Debug, Clone)]
pub struct FeedForwardSublayer {
    process: ProcessPair,
    ffn: FeedForward,
}

impl FeedForwardSublayer {
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let output = self.ffn.forward(&self.process.pre.forward(input)?)?;
        Ok(self.process.post.forward(&output, input)?)
    }
}

/// Hands out consistently configured sublayers.
pub(crate) struct SublayerBuilder<'a> {
    pub config: &'a TransformerConfig,
    pub options: &'a ResolvedOptions,
    pub device: &'a Device,
}

impl<'a> SublayerBuilder<'a> {
    pub fn new(config: &'a TransformerConfig, options: &'a ResolvedOptions, device: &'a Device) -> Self {
        Self {
            config,
            options,
            device,
        }
    }

    pub fn dropout(&self, probability: f32) -> layers::Dropout {
        self.config.dropout_layer(probability)
    }

    /// Pre-process configured by `ops` with the wrapper dropout.
    pub fn pre_process(&self, ops: &ProcessSequence) -> Result<PreProcess> {
        let dropout = self.dropout(self.config.dropout);
        Ok(PreProcess::new(ops.clone(), self.config.dim_emb, dropout, self.device)?)
    }

    pub fn process_pair(&self) -> Result<ProcessPair> {
        let pre = self.pre_process(&self.options.preprocess)?;
        let dropout = self.dropout(self.config.dropout);
        let post = PostProcess::new(self.options.postprocess.clone(), self.config.dim_emb, dropout, self.device)?;
        Ok(ProcessPair { pre, post })
    }

    /// Attention over key/value sources of width `kv_dim`.
    pub fn attention(&self, kv_dim: usize) -> Result<AttentionSublayer> {
        let mut config = MultiHeadConfig::new(self.config.dim_emb, self.config.heads).with_kv_dim(kv_dim);
        config.no_projection = self.config.no_projection;
        config.dropout_p = self.config.effective_dropout(self.config.dropout_attention);
        Ok(AttentionSublayer {
            process: self.process_pair()?,
            attention: MultiHeadAttention::new(config, self.device)?,
        })
    }

    pub fn feed_forward(&self) -> Result<FeedForwardSublayer> {
        let config = FeedForwardConfig {
            depth: self.config.ffn_depth,
            dropout: self.config.effective_dropout(self.config.dropout_ffn),
            ..FeedForwardConfig::new(self.config.dim_emb, self.config.dim_ffn, self.options.ffn_activation)
        };
        Ok(FeedForwardSublayer {
            process: self.process_pair()?,
            ffn: FeedForward::new(config, self.device)?,
        })
    }
}
