//! Average attention: every position attends uniformly to itself and all
//! earlier positions, followed by a small dense stack and an optional gate.

use attention::masks::causal_mask;
use candle_core::{DType, Tensor};
use candle_nn::ops::sigmoid;
use layers::{Dense, Linear, LinearConfig};

use crate::error::{ModelError, Result};
use crate::sublayer::{ProcessPair, SublayerBuilder};

/// Input and average gates, `y = σ(Wi x) x + σ(Wf y) y`.
#[derive(Debug, Clone)]
struct AverageGate {
    input: Linear,
    average: Linear,
}

impl AverageGate {
    fn forward(&self, input: &Tensor, average: &Tensor) -> Result<Tensor> {
        let input_gate = sigmoid(&self.input.forward(input)?)?;
        let average_gate = sigmoid(&self.average.forward(average)?)?;
        Ok(input_gate.mul(input)?.add(&average_gate.mul(average)?)?)
    }
}

#[derive(Debug, Clone)]
pub struct AverageAttentionLayer {
    process: ProcessPair,
    inner: Vec<Dense>,
    output: Option<Linear>,
    gate: Option<AverageGate>,
}

impl AverageAttentionLayer {
    pub(crate) fn build(builder: &SublayerBuilder<'_>) -> Result<Self> {
        let config = builder.config;
        let device = builder.device;
        let process = builder.process_pair()?;

        let mut inner = Vec::with_capacity(config.aan_depth.saturating_sub(1));
        let mut width = config.dim_emb;
        for _ in 1..config.aan_depth {
            inner.push(Dense::xavier_uniform(
                width,
                config.dim_aan,
                Some(builder.options.aan_activation),
                builder.dropout(config.dropout_ffn),
                device,
            )?);
            width = config.dim_aan;
        }
        let output = if width != config.dim_emb {
            Some(Linear::xavier_uniform(LinearConfig::new(width, config.dim_emb), device)?)
        } else {
            None
        };
        let gate = if config.aan_nogate {
            None
        } else {
            Some(AverageGate {
                input: Linear::xavier_uniform(LinearConfig::new(config.dim_emb, config.dim_emb), device)?,
                average: Linear::xavier_uniform(LinearConfig::new(config.dim_emb, config.dim_emb), device)?,
            })
        };

        Ok(Self {
            process,
            inner,
            output,
            gate,
        })
    }

    /// Returns the layer output and the running average at the last position.
    pub fn forward(
        &self,
        input: &Tensor,
        previous: Option<&Tensor>,
        target_mask: Option<&Tensor>,
        position: usize,
    ) -> Result<(Tensor, Tensor)> {
        let average = match target_mask {
            Some(mask) => masked_running_average(input, previous, mask, position)?,
            None => running_average(input, previous, position)?,
        };
        let len = average.dim(2)?;
        let state = average.narrow(2, len - 1, 1)?;

        let mut y = self.process.pre.forward(&average)?;
        for dense in &self.inner {
            y = dense.forward(&y)?;
        }
        if let Some(output) = &self.output {
            y = output.forward(&y)?;
        }
        if let Some(gate) = &self.gate {
            y = gate.forward(input, &y)?;
        }
        Ok((self.process.post.forward(&y, input)?, state))
    }
}

/// Cumulative average of `input` over time, continuing from `position`
/// earlier positions whose average is `previous` (`(beam, batch, 1, dim)`).
///
/// Output position `i` holds `(previous * position + Σ_{j<=i} x_j) / (position + i + 1)`.
pub fn running_average(input: &Tensor, previous: Option<&Tensor>, position: usize) -> Result<Tensor> {
    let (beam, batch, len, _) = input.dims4()?;
    let device = input.device();

    let cumulative = if len == 1 {
        input.clone()
    } else {
        causal_mask(len, device)?
            .broadcast_as((beam, batch, len, len))?
            .contiguous()?
            .matmul(&input.contiguous()?)?
    };

    let summed = match (position, previous) {
        (0, _) => cumulative,
        (_, Some(previous)) => cumulative.broadcast_add(&previous.affine(position as f64, 0.0)?)?,
        (_, None) => {
            return Err(ModelError::Shape(format!(
                "average attention at position {position} needs the previous average"
            )))
        }
    };

    let counts: Vec<f32> = (0..len).map(|i| (position + i + 1) as f32).collect();
    let counts = Tensor::from_vec(counts, (len, 1), device)?;
    Ok(summed.broadcast_div(&counts)?)
}

/// [`running_average`] that skips padded target positions.
///
/// `target_mask` is `(batch, len)` or `(beam, batch, len)` with 1 for real
/// tokens. Position `i` averages the earlier positions and the unpadded
/// positions `<= i` of `input`; a row with nothing to average yields zeros.
pub fn masked_running_average(
    input: &Tensor,
    previous: Option<&Tensor>,
    target_mask: &Tensor,
    position: usize,
) -> Result<Tensor> {
    let (beam, batch, len, dim) = input.dims4()?;
    let keys = match target_mask.dims() {
        [b, l] if *b == batch && *l == len => target_mask.reshape((1, batch, 1, len))?,
        [m, b, l] if (*m == beam || *m == 1) && *b == batch && *l == len => target_mask.reshape((*m, batch, 1, len))?,
        other => {
            return Err(ModelError::Shape(format!(
                "target mask {other:?} does not match {batch} sentences of length {len}"
            )))
        }
    };

    let weights = causal_mask(len, input.device())?
        .broadcast_mul(&keys.to_dtype(DType::F32)?)?
        .broadcast_as((beam, batch, len, len))?
        .contiguous()?;
    let mut summed = weights.matmul(&input.contiguous()?)?;
    let mut counts = weights.sum_keepdim(3)?;
    if position > 0 {
        let previous = previous.ok_or_else(|| {
            ModelError::Shape(format!("average attention at position {position} needs the previous average"))
        })?;
        summed = summed.broadcast_add(&previous.affine(position as f64, 0.0)?)?;
        counts = counts.affine(1.0, position as f64)?;
    }
    let counts = counts.maximum(1f64)?.broadcast_as((beam, batch, len, dim))?;
    Ok(summed.div(&counts)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn max_diff(a: &Tensor, b: &Tensor) -> Result<f32> {
        Ok(a.sub(b)?.abs()?.max_all()?.to_vec0::<f32>()?)
    }

    #[test]
    fn full_sequence_average_is_cumulative_mean() -> Result<()> {
        let input = Tensor::new(&[1f32, 3.0, 5.0, 7.0], &Device::Cpu)?.reshape((1, 1, 4, 1))?;
        let average = running_average(&input, None, 0)?;
        assert_eq!(average.flatten_all()?.to_vec1::<f32>()?, vec![1.0, 2.0, 3.0, 4.0]);
        Ok(())
    }

    #[test]
    fn incremental_average_matches_full_sequence() -> Result<()> {
        let device = Device::Cpu;
        let input = Tensor::randn(0f32, 1.0, (2, 3, 5, 4), &device)?;
        let full = running_average(&input, None, 0)?;

        let mut previous: Option<Tensor> = None;
        for t in 0..5 {
            let step = input.narrow(2, t, 1)?;
            let average = running_average(&step, previous.as_ref(), t)?;
            assert!(max_diff(&average, &full.narrow(2, t, 1)?)? < 1e-5);
            previous = Some(average);
        }
        Ok(())
    }

    #[test]
    fn chunked_continuation_matches_full_sequence() -> Result<()> {
        let device = Device::Cpu;
        let input = Tensor::randn(0f32, 1.0, (1, 2, 6, 3), &device)?;
        let full = running_average(&input, None, 0)?;
        let head = running_average(&input.narrow(2, 0, 2)?, None, 0)?;
        let tail = running_average(&input.narrow(2, 2, 4)?, Some(&head.narrow(2, 1, 1)?), 2)?;
        assert!(max_diff(&tail, &full.narrow(2, 2, 4)?)? < 1e-5);
        Ok(())
    }

    #[test]
    fn padded_positions_are_left_out_of_the_average() -> Result<()> {
        let device = Device::Cpu;
        let input = Tensor::new(&[1f32, 3.0, 5.0, 7.0, 2.0, 4.0, 6.0, 8.0], &device)?.reshape((1, 2, 4, 1))?;
        let mask = Tensor::new(&[[1f32, 1.0, 0.0, 0.0], [1.0, 1.0, 1.0, 1.0]], &device)?;
        let average = masked_running_average(&input, None, &mask, 0)?;
        let rows = average.reshape((2, 4))?.to_vec2::<f32>()?;
        assert_eq!(rows[0], vec![1.0, 2.0, 2.0, 2.0]);
        assert_eq!(rows[1], vec![2.0, 3.0, 4.0, 5.0]);

        let unmasked = running_average(&input, None, 0)?;
        assert!(max_diff(&average.get(0)?.get(1)?, &unmasked.get(0)?.get(1)?)? < 1e-6);
        Ok(())
    }

    #[test]
    fn masked_continuation_counts_history_as_valid() -> Result<()> {
        let device = Device::Cpu;
        let input = Tensor::randn(0f32, 1.0, (2, 1, 5, 3), &device)?;
        let full = running_average(&input, None, 0)?;
        let head = running_average(&input.narrow(2, 0, 3)?, None, 0)?;
        let ones = Tensor::ones((1, 2), DType::F32, &device)?;
        let tail = masked_running_average(&input.narrow(2, 3, 2)?, Some(&head.narrow(2, 2, 1)?), &ones, 3)?;
        assert!(max_diff(&tail, &full.narrow(2, 3, 2)?)? < 1e-5);
        Ok(())
    }

    #[test]
    fn missing_previous_average_is_an_error() -> Result<()> {
        let input = Tensor::zeros((1, 1, 1, 2), candle_core::DType::F32, &Device::Cpu)?;
        assert!(matches!(running_average(&input, None, 3), Err(ModelError::Shape(_))));
        Ok(())
    }
}
