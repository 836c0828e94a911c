//! Reference CPU attention kernel.
//!
//! The exact path prioritises numerical fidelity and mirrors the semantics
//! described by the [`Attention`](crate::core::Attention) trait.

use std::sync::OnceLock;

use candle_core::{DType, Tensor};
use candle_nn::ops::{dropout, softmax_last_dim};

use crate::core::{Attention, AttentionError, Config};
use crate::masks::AdditiveMask;

/// Numerically stable, portable scaled dot-product attention.
#[derive(Debug, Default)]
pub struct ExactAttention {
    first_call: OnceLock<()>,
}

impl ExactAttention {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clone for ExactAttention {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl Attention for ExactAttention {
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&AdditiveMask>,
        config: &Config,
    ) -> Result<Tensor, AttentionError> {
        if self.first_call.set(()).is_ok() {
            log::debug!(
                "attention::reference init dropout={:?} masked={}",
                config.dropout_p,
                mask.is_some()
            );
        }

        if [q, k, v].iter().any(|t| t.dtype() != DType::F32) {
            return Err(AttentionError::InvalidShape {
                context: "q, k, v must be f32".to_string(),
            });
        }

        let (rows, heads, q_len, head_dim) = q.dims4().map_err(|_| AttentionError::InvalidShape {
            context: "q must have shape [rows, heads, q_len, head_dim]".to_string(),
        })?;
        let (kr, kh, k_len, kd) = k.dims4().map_err(|_| AttentionError::InvalidShape {
            context: "k must have shape [rows, heads, k_len, head_dim]".to_string(),
        })?;
        let (vr, vh, vk, vd) = v.dims4().map_err(|_| AttentionError::InvalidShape {
            context: "v must have shape [rows, heads, k_len, head_dim]".to_string(),
        })?;
        if kr != rows || kh != heads || kd != head_dim {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "k shape mismatch: expected [{rows}, {heads}, ?, {head_dim}] got [{kr}, {kh}, {k_len}, {kd}]"
                ),
            });
        }
        if vr != rows || vh != heads || vk != k_len || vd != head_dim {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "v shape mismatch: expected [{rows}, {heads}, {k_len}, {head_dim}] got [{vr}, {vh}, {vk}, {vd}]"
                ),
            });
        }

        let scale = 1.0 / (head_dim as f64).sqrt();
        let mut scores = q.matmul(&k.transpose(2, 3)?.contiguous()?)?.affine(scale, 0.0)?;

        if let Some(mask) = mask {
            let (mr, mh, mq, mk) = mask.as_tensor().dims4()?;
            if (mr != rows && mr != 1) || (mh != 1 && mh != heads) || (mq != 1 && mq != q_len) || mk != k_len {
                return Err(AttentionError::InvalidShape {
                    context: format!(
                        "mask shape mismatch: expected [1|{rows}, 1|{heads}, 1|{q_len}, {k_len}] got [{mr}, {mh}, {mq}, {mk}]"
                    ),
                });
            }
            scores = scores.broadcast_add(mask.as_tensor())?;
        }

        let mut weights = softmax_last_dim(&scores)?;
        if let Some(dropout_p) = config.dropout_p {
            if !(0.0..1.0).contains(&dropout_p) {
                return Err(AttentionError::InvalidShape {
                    context: format!("dropout probability must be in [0, 1), got {dropout_p}"),
                });
            }
            if dropout_p > 0.0 {
                weights = dropout(&weights, dropout_p)?;
            }
        }

        Ok(weights.matmul(v)?)
    }
}
