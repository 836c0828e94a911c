//! Recurrent autoregressive sublayer built on the candle-nn GRU/LSTM cells.

use candle_core::{DType, Tensor};
use candle_nn::rnn::{gru, lstm, GRUConfig, GRUState, LSTMConfig, LSTMState, GRU, LSTM, RNN};
use candle_nn::{VarBuilder, VarMap};

use crate::config::RecurrentCellKind;
use layers::Dropout;

use crate::error::{ModelError, Result};
use crate::sublayer::{ProcessPair, SublayerBuilder};

/// Last hidden (and, for LSTMs, cell) state of every `(beam, batch)` slot.
///
/// Tensors are `(beam * batch, dim)` with beam-major rows.
#[derive(Debug, Clone)]
pub struct RecurrentState {
    pub hidden: Tensor,
    pub cell: Option<Tensor>,
}

#[derive(Debug, Clone)]
enum Cell {
    Gru(GRU),
    Lstm(LSTM),
}

impl Cell {
    fn zero_state(&self, rows: usize) -> Result<RecurrentState> {
        Ok(match self {
            Cell::Gru(cell) => RecurrentState {
                hidden: cell.zero_state(rows)?.h,
                cell: None,
            },
            Cell::Lstm(cell) => {
                let state = cell.zero_state(rows)?;
                RecurrentState {
                    hidden: state.h,
                    cell: Some(state.c),
                }
            }
        })
    }

    fn step(&self, input: &Tensor, state: &RecurrentState) -> Result<RecurrentState> {
        Ok(match (self, &state.cell) {
            (Cell::Gru(cell), _) => RecurrentState {
                hidden: cell.step(input, &GRUState { h: state.hidden.clone() })?.h,
                cell: None,
            },
            (Cell::Lstm(cell), Some(c)) => {
                let next = cell.step(
                    input,
                    &LSTMState {
                        h: state.hidden.clone(),
                        c: c.clone(),
                    },
                )?;
                RecurrentState {
                    hidden: next.h,
                    cell: Some(next.c),
                }
            }
            (Cell::Lstm(_), None) => {
                return Err(ModelError::Shape("LSTM state is missing its cell tensor".into()))
            }
        })
    }
}

/// Pre-process, a recurrent cell run over time, then post-process.
#[derive(Debug, Clone)]
pub struct RecurrentLayer {
    process: ProcessPair,
    cell: Cell,
    kind: RecurrentCellKind,
    recurrent_dropout: Dropout,
}

impl RecurrentLayer {
    pub(crate) fn build(builder: &SublayerBuilder<'_>) -> Result<Self> {
        let dim = builder.config.dim_emb;
        let kind = builder.options.dec_cell;
        let params = VarMap::new();
        let vb = VarBuilder::from_varmap(&params, DType::F32, builder.device);
        let cell = match kind {
            RecurrentCellKind::Gru => Cell::Gru(gru(dim, dim, GRUConfig::default(), vb.pp("cell"))?),
            RecurrentCellKind::Lstm => Cell::Lstm(lstm(dim, dim, LSTMConfig::default(), vb.pp("cell"))?),
        };
        Ok(Self {
            process: builder.process_pair()?,
            cell,
            kind,
            recurrent_dropout: builder.dropout(builder.config.dropout_rnn),
        })
    }

    pub fn kind(&self) -> RecurrentCellKind {
        self.kind
    }

    /// Runs the cell over `input` (`(beam, batch, len, dim)`), starting from
    /// `prior` or from zeros, and returns the output with the final state.
    pub fn forward(&self, input: &Tensor, prior: Option<&RecurrentState>) -> Result<(Tensor, RecurrentState)> {
        let (beam, batch, len, dim) = input.dims4()?;
        let rows = beam * batch;
        let mut state = match prior {
            Some(prior) => {
                let prior_rows = prior.hidden.dim(0)?;
                if prior_rows != rows {
                    return Err(ModelError::Shape(format!(
                        "recurrent state covers {prior_rows} slots, input has {rows}"
                    )));
                }
                prior.clone()
            }
            None => self.cell.zero_state(rows)?,
        };

        let x = self.process.pre.forward(input)?.reshape((rows, len, dim))?;
        let x = self.recurrent_dropout.forward_with_noise_shape(&x, &[rows, 1, dim])?;
        let state_mask = self
            .recurrent_dropout
            .is_active()
            .then(|| self.recurrent_dropout.mask(&[rows, dim], &x))
            .transpose()?;
        let mut outputs = Vec::with_capacity(len);
        for t in 0..len {
            if let Some(mask) = &state_mask {
                state.hidden = state.hidden.mul(mask)?;
            }
            state = self.cell.step(&x.narrow(1, t, 1)?.squeeze(1)?, &state)?;
            outputs.push(state.hidden.unsqueeze(1)?);
        }
        let output = Tensor::cat(&outputs, 1)?.reshape((beam, batch, len, dim))?;
        Ok((self.process.post.forward(&output, input)?, state))
    }
}
