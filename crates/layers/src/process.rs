//! Pre/post-processing wrappers placed around every sublayer.
//!
//! A wrapper is configured by a short operation string such as `"dan"`:
//!
//! | symbol | operation                                   | pre | post |
//! |--------|---------------------------------------------|-----|------|
//! | `d`    | dropout                                     | yes | yes  |
//! | `n`    | layer normalisation                         | yes | yes  |
//! | `a`    | residual add of the sublayer input          | no  | yes  |
//! | `h`    | highway gate between output and input       | no  | yes  |
//!
//! Operations run left to right. Pre-processing sees only the sublayer
//! input; post-processing sees the sublayer output and the original
//! (un-preprocessed) input. Strings are parsed once, at construction.

use std::fmt;

use candle_core::{Device, Result, Tensor};

use crate::dropout::Dropout;
use crate::norm::LayerNorm;
use crate::residual::{residual_add, Highway};
use crate::LayerError;

/// Which side of the sublayer an operation string applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStage {
    Pre,
    Post,
}

impl fmt::Display for ProcessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStage::Pre => f.write_str("pre-processing"),
            ProcessStage::Post => f.write_str("post-processing"),
        }
    }
}

/// A single wrapper operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOp {
    Dropout,
    Norm,
    Add,
    Highway,
}

impl ProcessOp {
    fn from_symbol(symbol: char, stage: ProcessStage) -> std::result::Result<Self, LayerError> {
        let op = match symbol {
            'd' => ProcessOp::Dropout,
            'n' => ProcessOp::Norm,
            'a' if stage == ProcessStage::Post => ProcessOp::Add,
            'h' if stage == ProcessStage::Post => ProcessOp::Highway,
            op => return Err(LayerError::UnknownProcessOp { op, stage }),
        };
        Ok(op)
    }
}

/// Parsed operation string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessSequence {
    ops: Vec<ProcessOp>,
}

impl ProcessSequence {
    /// Parses an operation string for the given stage.
    pub fn parse(sequence: &str, stage: ProcessStage) -> std::result::Result<Self, LayerError> {
        let ops = sequence
            .chars()
            .map(|symbol| ProcessOp::from_symbol(symbol, stage))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { ops })
    }

    pub fn ops(&self) -> &[ProcessOp] {
        &self.ops
    }

    pub fn contains(&self, op: ProcessOp) -> bool {
        self.ops.contains(&op)
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Pre-processing applied to a sublayer's input.
#[derive(Debug, Clone)]
pub struct PreProcess {
    ops: ProcessSequence,
    norm: Option<LayerNorm>,
    dropout: Dropout,
}

impl PreProcess {
    pub fn new(ops: ProcessSequence, hidden: usize, dropout: Dropout, device: &Device) -> Result<Self> {
        let norm = if ops.contains(ProcessOp::Norm) {
            Some(LayerNorm::identity(hidden, device)?)
        } else {
            None
        };
        Ok(Self { ops, norm, dropout })
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let mut output = input.clone();
        for op in self.ops.ops() {
            output = match (op, &self.norm) {
                (ProcessOp::Dropout, _) => self.dropout.forward(&output)?,
                (ProcessOp::Norm, Some(norm)) => norm.forward(&output)?,
                // Construction only admits `d` and `n`, and allocates the norm with `n`.
                _ => output,
            };
        }
        Ok(output)
    }
}

/// Post-processing that merges a sublayer's output with its original input.
#[derive(Debug, Clone)]
pub struct PostProcess {
    ops: ProcessSequence,
    norm: Option<LayerNorm>,
    highway: Option<Highway>,
    dropout: Dropout,
}

impl PostProcess {
    pub fn new(ops: ProcessSequence, hidden: usize, dropout: Dropout, device: &Device) -> Result<Self> {
        let norm = if ops.contains(ProcessOp::Norm) {
            Some(LayerNorm::identity(hidden, device)?)
        } else {
            None
        };
        let highway = if ops.contains(ProcessOp::Highway) {
            Some(Highway::new(hidden, device)?)
        } else {
            None
        };
        Ok(Self {
            ops,
            norm,
            highway,
            dropout,
        })
    }

    pub fn forward(&self, output: &Tensor, prev_input: &Tensor) -> Result<Tensor> {
        let mut result = output.clone();
        for op in self.ops.ops() {
            result = match op {
                ProcessOp::Dropout => self.dropout.forward(&result)?,
                ProcessOp::Add => residual_add(&result, prev_input)?,
                ProcessOp::Highway => match &self.highway {
                    Some(highway) => highway.forward(&result, prev_input)?,
                    None => result,
                },
                ProcessOp::Norm => match &self.norm {
                    Some(norm) => norm.forward(&result)?,
                    None => result,
                },
            };
        }
        Ok(result)
    }
}
