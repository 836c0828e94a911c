//! Autoregressive sublayers of the decoder.
//!
//! Each variant turns the decoder layer input at positions
//! `position..position + len` into an output of the same shape, consuming the
//! [`LayerState`] it produced for earlier positions.

pub mod average;
pub mod recurrent;
pub mod self_attention;

use candle_core::Tensor;

pub use average::{masked_running_average, running_average, AverageAttentionLayer};
pub use recurrent::{RecurrentLayer, RecurrentState};
pub use self_attention::{self_attention_mask, SelfAttentionLayer};

use crate::config::AutoregressiveKind;
use crate::error::{ModelError, Result};
use crate::sublayer::SublayerBuilder;

/// What a decoder layer remembers between steps.
#[derive(Debug, Clone)]
pub enum LayerState {
    /// Raw layer inputs of all positions so far, `(beam, batch, time, dim)`.
    History(Tensor),
    /// Running average at the last position, `(beam, batch, 1, dim)`.
    Average(Tensor),
    /// Final recurrent cell state.
    Recurrent(RecurrentState),
}

impl LayerState {
    fn variant(&self) -> &'static str {
        match self {
            LayerState::History(_) => "self-attention history",
            LayerState::Average(_) => "running average",
            LayerState::Recurrent(_) => "recurrent state",
        }
    }
}

#[derive(Debug, Clone)]
pub enum AutoregressiveLayer {
    SelfAttention(SelfAttentionLayer),
    Average(AverageAttentionLayer),
    Recurrent(RecurrentLayer),
}

impl AutoregressiveLayer {
    pub(crate) fn build(kind: AutoregressiveKind, builder: &SublayerBuilder<'_>) -> Result<Self> {
        Ok(match kind {
            AutoregressiveKind::SelfAttention => {
                Self::SelfAttention(SelfAttentionLayer::new(builder.attention(builder.config.dim_emb)?))
            }
            AutoregressiveKind::AverageAttention => Self::Average(AverageAttentionLayer::build(builder)?),
            AutoregressiveKind::Rnn => Self::Recurrent(RecurrentLayer::build(builder)?),
        })
    }

    pub fn kind(&self) -> AutoregressiveKind {
        match self {
            Self::SelfAttention(_) => AutoregressiveKind::SelfAttention,
            Self::Average(_) => AutoregressiveKind::AverageAttention,
            Self::Recurrent(_) => AutoregressiveKind::Rnn,
        }
    }

    /// Processes `input` at `position` and returns the output with the new
    /// layer state. `prior` must be `None` exactly when `position == 0`.
    pub fn forward(
        &self,
        input: &Tensor,
        prior: Option<&LayerState>,
        target_mask: Option<&Tensor>,
        position: usize,
    ) -> Result<(Tensor, LayerState)> {
        match (self, prior) {
            (Self::SelfAttention(layer), None) => {
                let (output, history) = layer.forward(input, None, target_mask)?;
                Ok((output, LayerState::History(history)))
            }
            (Self::SelfAttention(layer), Some(LayerState::History(history))) => {
                let (output, history) = layer.forward(input, Some(history), target_mask)?;
                Ok((output, LayerState::History(history)))
            }
            (Self::Average(layer), None) => {
                let (output, average) = layer.forward(input, None, target_mask, position)?;
                Ok((output, LayerState::Average(average)))
            }
            (Self::Average(layer), Some(LayerState::Average(previous))) => {
                let (output, average) = layer.forward(input, Some(previous), target_mask, position)?;
                Ok((output, LayerState::Average(average)))
            }
            (Self::Recurrent(layer), None) => {
                let (output, state) = layer.forward(input, None)?;
                Ok((output, LayerState::Recurrent(state)))
            }
            (Self::Recurrent(layer), Some(LayerState::Recurrent(prior))) => {
                let (output, state) = layer.forward(input, Some(prior))?;
                Ok((output, LayerState::Recurrent(state)))
            }
            (layer, Some(state)) => Err(ModelError::Shape(format!(
                "{} layer cannot continue from a {}",
                layer.kind(),
                state.variant()
            ))),
        }
    }
}
