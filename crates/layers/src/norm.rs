//! Layer normalisation over the feature axis.
//!
//! Statistics are computed along the last axis and the learned scale/bias
//! are broadcast over every leading axis, so the same layer serves
//! `(batch, length, features)` and `(beam, batch, length, features)` inputs.

use candle_core::{DType, Device, Result, Tensor, D};

use crate::checks;

/// Numeric stabiliser added to the variance before the square root.
pub const LAYER_NORM_EPSILON: f64 = 1e-6;

/// Standard LayerNorm with learnable scale and bias.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    hidden_size: usize,
    epsilon: f64,
    scale: Tensor,
    bias: Tensor,
}

impl LayerNorm {
    /// Constructs a LayerNorm from explicit parameters shaped `(hidden_size,)`.
    pub fn new(scale: Tensor, bias: Tensor, epsilon: f64) -> Result<Self> {
        checks::expect_rank("norm.scale", &scale, 1)?;
        let hidden_size = scale.dims()[0];
        checks::expect_shape("norm.bias", &bias, &[hidden_size])?;
        Ok(Self {
            hidden_size,
            epsilon,
            scale,
            bias,
        })
    }

    /// Identity-initialised LayerNorm (scale = 1, bias = 0).
    pub fn identity(hidden_size: usize, device: &Device) -> Result<Self> {
        let scale = Tensor::ones(hidden_size, DType::F32, device)?;
        let bias = Tensor::zeros(hidden_size, DType::F32, device)?;
        Self::new(scale, bias, LAYER_NORM_EPSILON)
    }

    /// Width of the normalised feature axis.
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Normalises `hidden` along its last axis.
    pub fn forward(&self, hidden: &Tensor) -> Result<Tensor> {
        checks::expect_last_dim("norm.input", hidden, self.hidden_size)?;
        let width = self.hidden_size as f64;

        let mean = (hidden.sum_keepdim(D::Minus1)? / width)?;
        let centered = hidden.broadcast_sub(&mean)?;
        let variance = (centered.sqr()?.sum_keepdim(D::Minus1)? / width)?;
        let denom = (variance + self.epsilon)?.sqrt()?;
        let normalized = centered.broadcast_div(&denom)?;

        normalized
            .broadcast_mul(&self.scale)?
            .broadcast_add(&self.bias)
    }
}
