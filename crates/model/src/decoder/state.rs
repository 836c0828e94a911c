//! Immutable decoder state and beam reordering.

use candle_core::{Device, Tensor};

use crate::autoregressive::{LayerState, RecurrentState};
use crate::encoder::EncoderState;
use crate::error::{ModelError, Result};

/// Everything a decode step needs from the previous one.
///
/// A step never mutates its input state; it returns a new value.
#[derive(Debug, Clone)]
pub struct DecoderState {
    pub(crate) layers: Vec<LayerState>,
    pub(crate) logits: Option<Tensor>,
    pub(crate) encoder_states: Vec<EncoderState>,
    pub(crate) position: usize,
    pub(crate) session: u64,
    pub(crate) batch: usize,
}

impl DecoderState {
    pub(crate) fn start(session: u64, encoder_states: Vec<EncoderState>, batch: usize) -> Self {
        Self {
            layers: Vec::new(),
            logits: None,
            encoder_states,
            position: 0,
            session,
            batch,
        }
    }

    /// Per-layer carried state, one entry per decoder layer once a step ran.
    pub fn layers(&self) -> &[LayerState] {
        &self.layers
    }

    /// Logits of the last step, `(beam, batch, q, vocab)`.
    pub fn logits(&self) -> Option<&Tensor> {
        self.logits.as_ref()
    }

    pub fn encoder_states(&self) -> &[EncoderState] {
        &self.encoder_states
    }

    /// Number of target positions consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn session_id(&self) -> u64 {
        self.session
    }

    pub fn batch_size(&self) -> usize {
        self.batch
    }

    /// Hypotheses per batch entry carried by the layer states (1 before the
    /// first step).
    pub fn beam_size(&self) -> usize {
        match self.layers.first() {
            Some(LayerState::History(t)) | Some(LayerState::Average(t)) => t.dims()[0],
            Some(LayerState::Recurrent(state)) => state.hidden.dims()[0] / self.batch.max(1),
            None => 1,
        }
    }

    /// Reorders every layer state so that new slot `i` continues old
    /// flattened `(beam, batch)` slot `sel_idx[i]`.
    ///
    /// `sel_idx` has `beam_size * batch` entries in beam-major order. Logits
    /// are dropped; position, encoder states and session are kept.
    pub fn select(&self, sel_idx: &[usize], beam_size: usize) -> Result<Self> {
        if beam_size == 0 || sel_idx.len() != beam_size * self.batch {
            return Err(ModelError::Shape(format!(
                "selection of {} slots does not fit beam {beam_size} x batch {}",
                sel_idx.len(),
                self.batch
            )));
        }
        let slots = self.beam_size() * self.batch;
        if let Some(bad) = sel_idx.iter().find(|&&idx| idx >= slots) {
            return Err(ModelError::Shape(format!(
                "selected slot {bad} is out of range for {slots} hypotheses"
            )));
        }

        let layers = self
            .layers
            .iter()
            .map(|layer| select_layer(layer, sel_idx, beam_size, self.batch))
            .collect::<Result<Vec<_>>>()?;
        log::trace!("selected {} hypotheses, beam {beam_size}", sel_idx.len());
        Ok(Self {
            layers,
            logits: None,
            encoder_states: self.encoder_states.clone(),
            position: self.position,
            session: self.session,
            batch: self.batch,
        })
    }
}

fn select_layer(layer: &LayerState, sel_idx: &[usize], beam: usize, batch: usize) -> Result<LayerState> {
    Ok(match layer {
        LayerState::History(history) => LayerState::History(select_history(history, sel_idx, beam, batch)?),
        LayerState::Average(average) => LayerState::Average(select_history(average, sel_idx, beam, batch)?),
        LayerState::Recurrent(state) => {
            let rows = row_indices(sel_idx, state.hidden.device())?;
            LayerState::Recurrent(RecurrentState {
                hidden: state.hidden.index_select(&rows, 0)?,
                cell: state.cell.as_ref().map(|c| c.index_select(&rows, 0)).transpose()?,
            })
        }
    })
}

/// Gathers whole time lines of a `(beam, batch, time, dim)` tensor.
///
/// Selected slot `s` is expanded to rows `s * time .. s * time + time` of the
/// tensor flattened to `(beam * batch * time, dim)`.
pub fn select_history(history: &Tensor, sel_idx: &[usize], beam: usize, batch: usize) -> Result<Tensor> {
    let (_, _, time, dim) = history.dims4()?;
    let rows: Vec<u32> = expand_time_indices(sel_idx, time);
    let rows = Tensor::from_vec(rows, sel_idx.len() * time, history.device())?;
    let flat = history.reshape(((), dim))?;
    Ok(flat.index_select(&rows, 0)?.reshape((beam, batch, time, dim))?)
}

/// `[i * time + j for i in sel_idx for j in 0..time]`.
pub fn expand_time_indices(sel_idx: &[usize], time: usize) -> Vec<u32> {
    sel_idx
        .iter()
        .flat_map(|&slot| (0..time).map(move |offset| (slot * time + offset) as u32))
        .collect()
}

fn row_indices(sel_idx: &[usize], device: &Device) -> Result<Tensor> {
    let rows: Vec<u32> = sel_idx.iter().map(|&idx| idx as u32).collect();
    Ok(Tensor::from_vec(rows, sel_idx.len(), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    fn history(beam: usize, batch: usize, time: usize, dim: usize) -> Result<Tensor> {
        let total = beam * batch * time * dim;
        let data: Vec<f32> = (0..total).map(|v| v as f32).collect();
        Ok(Tensor::from_vec(data, (beam, batch, time, dim), &Device::Cpu)?)
    }

    fn state(layers: Vec<LayerState>, batch: usize) -> DecoderState {
        DecoderState {
            layers,
            logits: Some(Tensor::zeros((1, 1), DType::F32, &Device::Cpu).unwrap()),
            encoder_states: Vec::new(),
            position: 3,
            session: 9,
            batch,
        }
    }

    #[test]
    fn expands_each_slot_over_time() {
        assert_eq!(expand_time_indices(&[2, 0], 3), vec![6, 7, 8, 0, 1, 2]);
    }

    #[test]
    fn selected_slots_copy_whole_histories() -> Result<()> {
        let h = history(2, 2, 3, 2)?;
        let selected = select_history(&h, &[3, 3, 0, 1], 2, 2)?;
        let flat_old = h.reshape((4, 3, 2))?;
        let flat_new = selected.reshape((4, 3, 2))?;
        for (new_slot, old_slot) in [3usize, 3, 0, 1].into_iter().enumerate() {
            assert_eq!(
                flat_new.get(new_slot)?.to_vec2::<f32>()?,
                flat_old.get(old_slot)?.to_vec2::<f32>()?
            );
        }
        Ok(())
    }

    #[test]
    fn select_keeps_position_and_drops_logits() -> Result<()> {
        let s = state(vec![LayerState::History(history(2, 1, 4, 3)?)], 1);
        let next = s.select(&[1, 1, 0], 3)?;
        assert_eq!(next.position(), 3);
        assert_eq!(next.session_id(), 9);
        assert!(next.logits().is_none());
        assert_eq!(next.beam_size(), 3);
        Ok(())
    }

    #[test]
    fn recurrent_and_average_states_follow_their_slots() -> Result<()> {
        let hidden = Tensor::new(&[[0f32, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]], &Device::Cpu)?;
        let s = state(
            vec![
                LayerState::Recurrent(RecurrentState {
                    hidden: hidden.clone(),
                    cell: Some(hidden.affine(10.0, 0.0)?),
                }),
                LayerState::Average(history(2, 2, 1, 2)?),
            ],
            2,
        );
        let next = s.select(&[2, 3], 1)?;
        match &next.layers()[0] {
            LayerState::Recurrent(state) => {
                assert_eq!(state.hidden.to_vec2::<f32>()?, vec![vec![2.0, 2.0], vec![3.0, 3.0]]);
                let cell = state.cell.as_ref().unwrap().to_vec2::<f32>()?;
                assert_eq!(cell, vec![vec![20.0, 20.0], vec![30.0, 30.0]]);
            }
            other => panic!("unexpected layer state {other:?}"),
        }
        match &next.layers()[1] {
            LayerState::Average(avg) => {
                assert_eq!(avg.dims(), &[1, 2, 1, 2]);
                assert_eq!(avg.flatten_all()?.to_vec1::<f32>()?, vec![4.0, 5.0, 6.0, 7.0]);
            }
            other => panic!("unexpected layer state {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn composed_selection_equals_single_selection() -> Result<()> {
        let s = state(vec![LayerState::History(history(4, 1, 2, 3)?)], 1);
        let first = [3usize, 1, 1, 0];
        let second = [2usize, 0];
        let composed: Vec<usize> = second.iter().map(|&i| first[i]).collect();

        let twice = s.select(&first, 4)?.select(&second, 2)?;
        let once = s.select(&composed, 2)?;
        match (&twice.layers()[0], &once.layers()[0]) {
            (LayerState::History(a), LayerState::History(b)) => {
                assert_eq!(
                    a.flatten_all()?.to_vec1::<f32>()?,
                    b.flatten_all()?.to_vec1::<f32>()?
                );
            }
            _ => panic!("history expected"),
        }
        Ok(())
    }

    #[test]
    fn invalid_selections_are_rejected() -> Result<()> {
        let s = state(vec![LayerState::History(history(2, 2, 1, 1)?)], 2);
        assert!(matches!(s.select(&[0, 1, 2], 2), Err(ModelError::Shape(_))));
        assert!(matches!(s.select(&[0, 4], 1), Err(ModelError::Shape(_))));
        Ok(())
    }
}
