//! Deterministic sinusoidal position signal.
//!
//! For a model width `dim` the first `dim / 2` channels carry
//! `sin(p * exp(-i * inc))` and the next `dim / 2` channels the matching
//! cosine, where `inc = ln(MAX_TIMESCALE) / (dim / 2 - 1)`. With an odd width
//! the final channel is left at zero. The signal depends only on the absolute
//! position and the width, so a call with `start = k` and a single position
//! reproduces row `k` of a full-sequence call.

use candle_core::{Device, Error, Result, Tensor};

/// Largest wavelength scale of the signal.
pub const MAX_TIMESCALE: f64 = 10_000.0;

/// Builds the `(len, dim)` signal for absolute positions `start..start + len`.
pub fn sinusoidal_signal(start: usize, len: usize, dim: usize, device: &Device) -> Result<Tensor> {
    let num_timescales = dim / 2;
    let increment = if num_timescales > 1 {
        MAX_TIMESCALE.ln() / (num_timescales - 1) as f64
    } else {
        0.0
    };

    let mut data = vec![0f32; len * dim];
    for row in 0..len {
        let position = (start + row) as f64;
        let offset = row * dim;
        for i in 0..num_timescales {
            let angle = position * (-(i as f64) * increment).exp();
            data[offset + i] = angle.sin() as f32;
            data[offset + num_timescales + i] = angle.cos() as f32;
        }
    }
    Tensor::from_vec(data, (len, dim), device)
}

/// Adds the position signal to `embeddings` shaped `(.., len, dim)`.
///
/// The signal is broadcast across every leading axis (beam, batch).
pub fn add_positional_encoding(embeddings: &Tensor, start: usize) -> Result<Tensor> {
    let dims = embeddings.dims();
    if dims.len() < 2 {
        return Err(Error::Msg(format!(
            "positional encoding expects at least (len, dim), got {dims:?}"
        )));
    }
    let (len, dim) = (dims[dims.len() - 2], dims[dims.len() - 1]);
    let signal = sinusoidal_signal(start, len, dim, embeddings.device())?;
    embeddings.broadcast_add(&signal.to_dtype(embeddings.dtype())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    #[test]
    fn position_zero_is_sin_zero_cos_one() -> Result<()> {
        let signal = sinusoidal_signal(0, 1, 6, &Device::Cpu)?.to_vec2::<f32>()?;
        assert_eq!(signal[0], vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        Ok(())
    }

    #[test]
    fn first_channel_uses_unit_frequency() -> Result<()> {
        let signal = sinusoidal_signal(0, 3, 4, &Device::Cpu)?.to_vec2::<f32>()?;
        for (p, row) in signal.iter().enumerate() {
            assert!((row[0] - (p as f32).sin()).abs() < 1e-6);
            assert!((row[2] - (p as f32).cos()).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn odd_width_leaves_last_channel_empty() -> Result<()> {
        let signal = sinusoidal_signal(5, 2, 5, &Device::Cpu)?.to_vec2::<f32>()?;
        assert!(signal.iter().all(|row| row[4] == 0.0));
        Ok(())
    }

    #[test]
    fn signal_is_shared_across_beam_and_batch() -> Result<()> {
        let device = Device::Cpu;
        let zeros = Tensor::zeros((2, 3, 4, 8), DType::F32, &device)?;
        let encoded = add_positional_encoding(&zeros, 0)?;
        let first = encoded.get(0)?.get(0)?.to_vec2::<f32>()?;
        let last = encoded.get(1)?.get(2)?.to_vec2::<f32>()?;
        assert_eq!(first, last);
        Ok(())
    }

    #[test]
    fn rejects_rank_one_input() -> Result<()> {
        let input = Tensor::zeros(4, DType::F32, &Device::Cpu)?;
        assert!(add_positional_encoding(&input, 0).is_err());
        Ok(())
    }
}
