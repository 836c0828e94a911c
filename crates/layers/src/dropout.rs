//! Dropout used by the process wrappers, dense stacks and word dropout.
//!
//! Masks come from [`candle_nn::ops::dropout`]. A probability of `0.0`
//! (always the case at inference) disables the layer and the input is
//! returned unchanged.

use candle_core::{DType, Error, Result, Tensor};

/// Inverted dropout: kept values are scaled by `1 / (1 - p)`.
#[derive(Debug, Clone, Copy)]
pub struct Dropout {
    probability: f32,
}

impl Dropout {
    /// Creates a dropout layer; probabilities outside `(0, 1)` yield a no-op.
    pub fn new(probability: f32) -> Self {
        let probability = if probability > 0.0 && probability < 1.0 {
            probability
        } else {
            0.0
        };
        Self { probability }
    }

    /// A dropout layer that never drops anything.
    pub fn disabled() -> Self {
        Self { probability: 0.0 }
    }

    /// Returns the active probability, `0.0` when disabled.
    pub fn probability(&self) -> f32 {
        self.probability
    }

    pub fn is_active(&self) -> bool {
        self.probability > 0.0
    }

    /// Applies elementwise dropout.
    pub fn forward(&self, tensor: &Tensor) -> Result<Tensor> {
        if !self.is_active() {
            return Ok(tensor.clone());
        }
        candle_nn::ops::dropout(tensor, self.probability)
    }

    /// Applies dropout with a mask of shape `noise_dims` broadcast over `tensor`.
    ///
    /// Axes of size 1 in `noise_dims` share one draw, e.g. `(1, 1, len, 1)`
    /// drops whole positions.
    pub fn forward_with_noise_shape(&self, tensor: &Tensor, noise_dims: &[usize]) -> Result<Tensor> {
        let dims = tensor.dims();
        let compatible = noise_dims.len() == dims.len()
            && noise_dims
                .iter()
                .zip(dims)
                .all(|(noise, actual)| *noise == 1 || noise == actual);
        if !compatible {
            return Err(Error::Msg(format!(
                "dropout noise shape {noise_dims:?} does not broadcast to {dims:?}"
            )));
        }
        if !self.is_active() {
            return Ok(tensor.clone());
        }
        tensor.broadcast_mul(&self.mask(noise_dims, tensor)?)
    }

    /// Draws a scaled keep-mask of shape `dims` on the device and dtype of `like`.
    pub fn mask(&self, dims: &[usize], like: &Tensor) -> Result<Tensor> {
        let ones = Tensor::ones(dims, DType::F32, like.device())?;
        let mask = if self.is_active() {
            candle_nn::ops::dropout(&ones, self.probability)?
        } else {
            ones
        };
        mask.to_dtype(like.dtype())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn dropout_preserves_expectation() -> Result<()> {
        let device = Device::Cpu;
        let dropout = Dropout::new(0.25);
        let input = Tensor::ones((4, 8, 16), DType::F32, &device)?;
        let values = dropout.forward(&input)?.flatten_all()?.to_vec1::<f32>()?;
        let mean = values.iter().copied().sum::<f32>() / values.len() as f32;
        assert!((mean - 1.0).abs() < 0.15);
        assert!(values.iter().all(|&v| v == 0.0 || (v - 1.0 / 0.75).abs() < 1e-5));
        Ok(())
    }

    #[test]
    fn zero_probability_is_identity() -> Result<()> {
        let device = Device::Cpu;
        let dropout = Dropout::new(0.0);
        let input = Tensor::randn(0f32, 1.0, (2, 2, 4), &device)?;
        let out = dropout.forward(&input)?;
        let diff = input.sub(&out)?.abs()?.max_all()?.to_vec0::<f32>()?;
        assert_eq!(diff, 0.0);
        assert_eq!(dropout.probability(), 0.0);
        assert_eq!(Dropout::new(1.5).probability(), 0.0);
        Ok(())
    }

    #[test]
    fn noise_shape_drops_whole_positions() -> Result<()> {
        let device = Device::Cpu;
        let dropout = Dropout::new(0.5);
        let input = Tensor::ones((1, 2, 6, 3), DType::F32, &device)?;
        let out = dropout.forward_with_noise_shape(&input, &[1, 1, 6, 1])?;
        let rows = out.reshape((12, 3))?.to_vec2::<f32>()?;
        for row in &rows {
            assert!(row.iter().all(|v| *v == row[0]));
        }
        // Both batch entries share the positional draw.
        assert_eq!(rows[..6], rows[6..]);
        Ok(())
    }

    #[test]
    fn incompatible_noise_shape_is_rejected() -> Result<()> {
        let device = Device::Cpu;
        let dropout = Dropout::new(0.5);
        let input = Tensor::ones((2, 3), DType::F32, &device)?;
        assert!(dropout.forward_with_noise_shape(&input, &[2, 2]).is_err());
        Ok(())
    }
}
