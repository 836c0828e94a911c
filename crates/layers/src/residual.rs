//! Residual and highway connections.
//!
//! Both combinators merge a transformed branch with the sublayer's original
//! input and therefore require the two tensors to share a shape.

use candle_core::{Device, Result, Tensor};

use crate::activations::ActivationKind;
use crate::checks;
use crate::linear::{Linear, LinearConfig};

/// Adds `branch` to `residual` after checking the shapes agree.
pub fn residual_add(branch: &Tensor, residual: &Tensor) -> Result<Tensor> {
    checks::expect_same_shape("residual.branch", branch, "residual.input", residual)?;
    branch.add(residual)
}

/// Generic highway combinator: `σ(t)⊙output + (1 − σ(t))⊙input`.
pub fn highway(output: &Tensor, input: &Tensor, gate_logits: &Tensor) -> Result<Tensor> {
    checks::expect_same_shape("highway.output", output, "highway.input", input)?;
    checks::expect_same_shape("highway.gate", gate_logits, "highway.input", input)?;
    let gate = ActivationKind::Sigmoid.forward(gate_logits)?;
    let carry = gate.affine(-1.0, 1.0)?;
    output.mul(&gate)?.add(&input.mul(&carry)?)
}

/// Highway connection with its own learned gate projection.
#[derive(Debug, Clone)]
pub struct Highway {
    gate: Linear,
}

impl Highway {
    /// Creates a highway gate for a `hidden`-wide residual stream.
    pub fn new(hidden: usize, device: &Device) -> Result<Self> {
        let gate = Linear::xavier_uniform(LinearConfig::new(hidden, hidden), device)?;
        Ok(Self { gate })
    }

    /// Combines the sublayer `output` with its original `input`.
    pub fn forward(&self, output: &Tensor, input: &Tensor) -> Result<Tensor> {
        let gate_logits = self.gate.forward(input)?;
        highway(output, input, &gate_logits)
    }
}
