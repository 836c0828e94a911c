//! Splitting the feature axis into attention heads and joining it back.
//!
//! `split_heads` maps `[beam, batch, len, heads * depth]` to
//! `[beam * batch, heads, len, depth]`; `join_heads` is its inverse given the
//! beam count. The flattened leading axis is beam-major: row
//! `b * batch + i` holds hypothesis `b` of batch entry `i`.

use candle_core::{Result as CandleResult, Tensor};

use crate::core::AttentionError;

/// Splits the last axis of a 4-axis tensor into `heads` contiguous heads.
pub fn split_heads(input: &Tensor, heads: usize) -> Result<Tensor, AttentionError> {
    let (beam, batch, len, width) = input.dims4().map_err(|_| AttentionError::InvalidShape {
        context: format!("split_heads expects [beam, batch, len, features], got {:?}", input.dims()),
    })?;
    if heads == 0 || width % heads != 0 {
        return Err(AttentionError::InvalidShape {
            context: format!("feature width {width} is not divisible into {heads} heads"),
        });
    }
    Ok(split(input, beam * batch, len, heads, width / heads)?)
}

fn split(input: &Tensor, rows: usize, len: usize, heads: usize, depth: usize) -> CandleResult<Tensor> {
    input
        .reshape((rows, len, heads, depth))?
        .transpose(1, 2)?
        .contiguous()
}

/// Joins `[beam * batch, heads, len, depth]` back into `[beam, batch, len, heads * depth]`.
pub fn join_heads(input: &Tensor, beam: usize) -> Result<Tensor, AttentionError> {
    let (rows, heads, len, depth) = input.dims4().map_err(|_| AttentionError::InvalidShape {
        context: format!("join_heads expects [rows, heads, len, depth], got {:?}", input.dims()),
    })?;
    if beam == 0 || rows % beam != 0 {
        return Err(AttentionError::InvalidShape {
            context: format!("{rows} rows cannot be split into {beam} beams"),
        });
    }
    Ok(input
        .transpose(1, 2)?
        .contiguous()?
        .reshape((beam, rows / beam, len, heads * depth))?)
}
