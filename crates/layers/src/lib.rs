//! Building blocks for transformer layers.
//!
//! Every component consumes and produces tensors whose last axis is the
//! feature axis; leading axes (beam, batch, length) are carried through
//! untouched. Forward passes return `candle_core::Result` so shape violations
//! surface as backend errors, while configuration strings (process
//! sequences, activation names, stack depths) are validated up front and
//! reported through [`LayerError`].

pub mod activations;
pub mod checks;
pub mod dropout;
pub mod linear;
pub mod mlp;
pub mod norm;
pub mod process;
pub mod residual;

use thiserror::Error;

pub use activations::ActivationKind;
pub use dropout::Dropout;
pub use linear::{Linear, LinearConfig};
pub use mlp::{Dense, FeedForward, FeedForwardConfig};
pub use norm::LayerNorm;
pub use process::{PostProcess, PreProcess, ProcessOp, ProcessSequence, ProcessStage};
pub use residual::Highway;

/// Errors raised while interpreting layer configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayerError {
    /// A pre/post-process string contained a symbol outside the supported set.
    #[error("unknown {stage} operation '{op}'")]
    UnknownProcessOp { op: char, stage: ProcessStage },
    /// The activation name is not one of the supported non-linearities.
    #[error("invalid activation name '{0}'")]
    UnknownActivation(String),
    /// A dense stack was configured with fewer than one layer.
    #[error("{name} depth {depth} is smaller than 1")]
    InvalidDepth { name: &'static str, depth: usize },
}
