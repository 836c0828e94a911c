//! Encoder-decoder transformer for translation.
//!
//! Source batches are encoded once into [`EncoderState`]s; the decoder then
//! runs either over a whole target sequence or one position at a time
//! through an immutable [`DecoderState`] bound to a [`DecodeSession`].

pub mod autoregressive;
pub mod batch;
pub mod config;
pub mod decoder;
pub mod embed;
pub mod encoder;
pub mod error;
pub mod model;
mod sublayer;

pub use autoregressive::{AutoregressiveLayer, LayerState, RecurrentState};
pub use batch::SourceBatch;
pub use config::{AutoregressiveKind, EncoderKind, RecurrentCellKind, ResolvedOptions, TransformerConfig};
pub use decoder::{DecodeSession, DecoderStack, DecoderState, OutputLayer};
pub use encoder::{BiGruEncoder, Encoder, EncoderState, TransformerEncoder};
pub use error::{ModelError, Result};
pub use model::Transformer;
pub use sublayer::{AttentionSublayer, FeedForwardSublayer, ProcessPair};
