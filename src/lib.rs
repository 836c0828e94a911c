//! Attention-based encoder/decoder core for neural machine translation.
//!
//! The workspace is split the same way the computation is:
//!
//! * [`layers`]: projections, activations, layer norm, dropout, residual and
//!   highway combinators, the pre/post-process wrapper and feed-forward stacks.
//! * [`embedding`]: token tables and the sinusoidal position signal.
//! * [`attention`]: masks, the scaled dot-product kernel, the multi-head block
//!   and the per-session projection cache.
//! * [`model`]: configuration, encoders, the decoder stack with its
//!   incremental state, beam selection and the [`Transformer`] facade.

pub use attention;
pub use embedding;
pub use layers;
pub use model;

pub use model::{
    DecodeSession, DecoderState, Encoder, EncoderState, LayerState, ModelError, SourceBatch, Transformer,
    TransformerConfig,
};
