//! Configuration options shared by all attention implementations.
//!
//! The [`Config`] struct captures run-time knobs such as dropout that callers
//! can tune without swapping implementations.

/// Configuration driving attention behaviour.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    /// Probability for dropout applied to attention weights during training.
    ///
    /// When `None`, dropout is disabled and the computation is deterministic.
    pub dropout_p: Option<f32>,
}

impl Config {
    /// Maps a raw probability to a config; `0.0` disables dropout.
    pub fn with_dropout(probability: f32) -> Self {
        Self {
            dropout_p: (probability > 0.0).then_some(probability),
        }
    }
}
