//! Lightweight validation helpers shared across layer components.
//!
//! These routines provide concise shape assertions that can be wired into
//! constructors or forward paths. They return `candle_core::Result<()>` so
//! call sites can propagate errors without panicking.

use candle_core::{Error, Result, Tensor};

/// Ensures a tensor matches the expected dimensions exactly.
pub fn expect_shape(name: &str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    let actual = tensor.dims();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name}: expected shape {expected:?}, got {actual:?}"
        )))
    }
}

/// Ensures a tensor has the requested rank.
pub fn expect_rank(name: &str, tensor: &Tensor, rank: usize) -> Result<()> {
    let dims = tensor.dims();
    if dims.len() == rank {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name}: expected rank {rank}, got shape {dims:?}"
        )))
    }
}

/// Ensures the trailing (feature) axis has the expected width.
pub fn expect_last_dim(name: &str, tensor: &Tensor, width: usize) -> Result<()> {
    match tensor.dims().last() {
        Some(&actual) if actual == width => Ok(()),
        _ => Err(Error::Msg(format!(
            "{name}: expected feature width {width}, got shape {:?}",
            tensor.dims()
        ))),
    }
}

/// Ensures two tensors share an identical shape.
pub fn expect_same_shape(left_name: &str, left: &Tensor, right_name: &str, right: &Tensor) -> Result<()> {
    if left.dims() == right.dims() {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{left_name} shape {:?} does not match {right_name} shape {:?}",
            left.dims(),
            right.dims()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn shape_checks_report_mismatches() -> Result<()> {
        let device = Device::Cpu;
        let a = Tensor::zeros((1, 2, 3, 4), DType::F32, &device)?;
        let b = Tensor::zeros((1, 2, 3, 5), DType::F32, &device)?;

        expect_shape("a", &a, &[1, 2, 3, 4])?;
        expect_rank("a", &a, 4)?;
        expect_last_dim("a", &a, 4)?;
        assert!(expect_last_dim("b", &b, 4).is_err());
        assert!(expect_same_shape("a", &a, "b", &b).is_err());
        assert!(expect_rank("a", &a, 3).is_err());
        Ok(())
    }
}
