//! Activation catalogue for feed-forward stacks and gates.
//!
//! Activations are elementwise and preserve the input layout.
//!
//! # Built-in formulas
//!
//! * **ReLU** computes `max(x, 0)`.
//! * **Swish** computes `x * sigmoid(x)` via Candle's fused SiLU kernel.
//! * **Sigmoid** computes `1 / (1 + exp(-x))`; it is used by gates and is not
//!   selectable by name for feed-forward stacks.

use std::fmt;
use std::str::FromStr;

use candle_core::{Result, Tensor};

use crate::LayerError;

/// Identifies which non-linearity is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    /// Rectified linear unit.
    Relu,
    /// Swish (a.k.a. SiLU).
    Swish,
    /// Logistic sigmoid, used for highway and AAN gates.
    Sigmoid,
}

impl ActivationKind {
    /// Applies the activation to `input`.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        match self {
            ActivationKind::Relu => input.relu(),
            ActivationKind::Swish => input.silu(),
            ActivationKind::Sigmoid => candle_nn::ops::sigmoid(input),
        }
    }
}

impl FromStr for ActivationKind {
    type Err = LayerError;

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name {
            "relu" => Ok(ActivationKind::Relu),
            "swish" => Ok(ActivationKind::Swish),
            other => Err(LayerError::UnknownActivation(other.to_string())),
        }
    }
}

impl fmt::Display for ActivationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivationKind::Relu => "relu",
            ActivationKind::Swish => "swish",
            ActivationKind::Sigmoid => "sigmoid",
        };
        f.write_str(name)
    }
}
