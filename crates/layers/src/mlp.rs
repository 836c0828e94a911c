//! Position-wise feed-forward blocks built on top of projections and activations.
//!
//! A [`FeedForward`] stack is `depth - 1` activated dense layers of width
//! `intermediate_size`, each followed by dropout, and one final linear
//! projection back to `hidden_size`. Inputs may have any rank; only the last
//! axis is transformed.

use candle_core::{Device, Error, Result, Tensor};

use crate::activations::ActivationKind;
use crate::dropout::Dropout;
use crate::linear::{Linear, LinearConfig};
use crate::LayerError;

/// A linear projection with an optional activation and trailing dropout.
#[derive(Debug, Clone)]
pub struct Dense {
    linear: Linear,
    activation: Option<ActivationKind>,
    dropout: Dropout,
}

impl Dense {
    pub fn new(linear: Linear, activation: Option<ActivationKind>, dropout: Dropout) -> Self {
        Self {
            linear,
            activation,
            dropout,
        }
    }

    /// Randomly initialised dense layer mapping `input_dim -> output_dim`.
    pub fn xavier_uniform(
        input_dim: usize,
        output_dim: usize,
        activation: Option<ActivationKind>,
        dropout: Dropout,
        device: &Device,
    ) -> Result<Self> {
        let linear = Linear::xavier_uniform(LinearConfig::new(input_dim, output_dim), device)?;
        Ok(Self::new(linear, activation, dropout))
    }

    pub fn output_dim(&self) -> usize {
        self.linear.config().output_dim
    }

    pub fn forward(&self, hidden: &Tensor) -> Result<Tensor> {
        let mut output = self.linear.forward(hidden)?;
        if let Some(activation) = &self.activation {
            output = activation.forward(&output)?;
        }
        self.dropout.forward(&output)
    }
}

/// Configuration shared by transformer feed-forward networks.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedForwardConfig {
    /// Model hidden size.
    pub hidden_size: usize,
    /// Width of the activation space.
    pub intermediate_size: usize,
    /// Activation applied after every inner layer.
    pub activation: ActivationKind,
    /// Total number of dense layers, including the output projection.
    pub depth: usize,
    /// Dropout applied after every inner activation.
    pub dropout: f32,
}

impl FeedForwardConfig {
    /// Creates the classic two-layer configuration.
    pub fn new(hidden_size: usize, intermediate_size: usize, activation: ActivationKind) -> Self {
        Self {
            hidden_size,
            intermediate_size,
            activation,
            depth: 2,
            dropout: 0.0,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), LayerError> {
        if self.depth < 1 {
            return Err(LayerError::InvalidDepth {
                name: "feed-forward",
                depth: self.depth,
            });
        }
        Ok(())
    }
}

/// Feed-forward stack described by [`FeedForwardConfig`].
#[derive(Debug, Clone)]
pub struct FeedForward {
    config: FeedForwardConfig,
    inner: Vec<Dense>,
    output: Linear,
}

impl FeedForward {
    /// Builds the stack described by `config`.
    pub fn new(config: FeedForwardConfig, device: &Device) -> Result<Self> {
        config
            .validate()
            .map_err(|err| Error::Msg(err.to_string()))?;

        let mut inner = Vec::with_capacity(config.depth - 1);
        let mut width = config.hidden_size;
        for _ in 0..config.depth - 1 {
            inner.push(Dense::xavier_uniform(
                width,
                config.intermediate_size,
                Some(config.activation),
                Dropout::new(config.dropout),
                device,
            )?);
            width = config.intermediate_size;
        }
        let output = Linear::xavier_uniform(
            LinearConfig::new(width, config.hidden_size),
            device,
        )?;
        log::debug!(
            "feed-forward stack: depth {}, {} -> {} -> {}",
            config.depth,
            config.hidden_size,
            config.intermediate_size,
            config.hidden_size
        );
        Ok(Self {
            config,
            inner,
            output,
        })
    }

    pub fn config(&self) -> &FeedForwardConfig {
        &self.config
    }

    pub fn forward(&self, hidden: &Tensor) -> Result<Tensor> {
        let mut output = hidden.clone();
        for dense in &self.inner {
            output = dense.forward(&output)?;
        }
        self.output.forward(&output)
    }
}
