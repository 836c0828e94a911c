//! Error type shared by the encoder, decoder and model facade.

use attention::AttentionError;
use layers::LayerError;
use thiserror::Error;

/// Failures raised while building or running the translation model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// One or more configuration options are invalid.
    #[error("invalid configuration: {}", .0.join("; "))]
    Config(Vec<String>),
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error(transparent)]
    Attention(#[from] AttentionError),
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
    /// A decoder state was stepped through a session that did not create it.
    #[error("decoder state belongs to session {state} but was stepped through session {session}")]
    SessionMismatch { state: u64, session: u64 },
    /// An explicit shape contract was violated.
    #[error("shape error: {0}")]
    Shape(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigFormat(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
