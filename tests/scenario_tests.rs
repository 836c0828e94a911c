use anyhow::Result;
use candle_core::{Device, Tensor};
use nmt_transformer::{LayerState, SourceBatch, Transformer, TransformerConfig};

const TARGET_VOCAB: usize = 17;

fn small_model(autoregressive: &str, device: &Device) -> Result<Transformer> {
    let config = TransformerConfig {
        dim_emb: 8,
        dim_vocabs: vec![19, TARGET_VOCAB],
        enc_depth: 2,
        dec_depth: 3,
        heads: 2,
        dim_ffn: 16,
        dim_aan: 16,
        decoder_autoreg: autoregressive.into(),
        inference: true,
        ..TransformerConfig::default()
    };
    Ok(Transformer::new(config, device)?)
}

fn slot(history: &Tensor, beam: usize) -> Result<Vec<Vec<f32>>> {
    Ok(history.get(beam)?.get(0)?.to_vec2::<f32>()?)
}

#[test]
fn encode_then_decode_four_steps() -> Result<()> {
    let device = Device::Cpu;
    let model = small_model("self-attention", &device)?;
    let batch = SourceBatch::from_sentences(&[vec![3, 4, 5], vec![6, 7, 8, 9, 10]], &device)?;

    let contexts = model.encode(&[batch])?;
    assert_eq!(contexts[0].context().dims(), &[1, 2, 5, 8]);
    assert_eq!(contexts[0].valid_positions()?, vec![3, 5]);

    let (mut session, mut state) = model.start_session(contexts)?;
    assert_eq!(state.position(), 0);
    assert!(state.logits().is_none());
    for step in 0..4u32 {
        let ids = Tensor::new(&[[step + 1], [step + 2]], &device)?;
        state = model.step(&mut session, &state, &ids, None)?;
        let logits = state.logits().expect("every step yields logits");
        assert_eq!(logits.dims(), &[1, 2, 1, TARGET_VOCAB]);
        assert_eq!(state.position(), step as usize + 1);
    }
    for layer in state.layers() {
        match layer {
            LayerState::History(history) => assert_eq!(history.dims(), &[1, 2, 4, 8]),
            other => panic!("expected history, got {other:?}"),
        }
    }
    Ok(())
}

#[test]
fn beam_selection_copies_parent_histories() -> Result<()> {
    let device = Device::Cpu;
    let model = small_model("self-attention", &device)?;
    let contexts = model.encode(&[SourceBatch::from_sentences(&[vec![1, 2, 3, 4]], &device)?])?;
    let (mut session, state) = model.start_session(contexts)?;

    let first = Tensor::new(&[1u32, 2, 3, 4], &device)?.reshape((4, 1, 1))?;
    let second = Tensor::new(&[5u32, 6, 7, 8], &device)?.reshape((4, 1, 1))?;
    let state = model.step(&mut session, &state, &first, None)?;
    let state = model.step(&mut session, &state, &second, None)?;
    assert_eq!(state.beam_size(), 4);

    let selected = state.select(&[0, 0, 2, 2], 4)?;
    assert_eq!(selected.position(), 2);
    assert!(selected.logits().is_none());
    for (before, after) in state.layers().iter().zip(selected.layers()) {
        let (LayerState::History(before), LayerState::History(after)) = (before, after) else {
            panic!("self-attention layers carry histories");
        };
        assert_eq!(after.dims(), &[4, 1, 2, 8]);
        assert_eq!(slot(after, 0)?, slot(before, 0)?);
        assert_eq!(slot(after, 1)?, slot(before, 0)?);
        assert_eq!(slot(after, 2)?, slot(before, 2)?);
        assert_eq!(slot(after, 3)?, slot(before, 2)?);
    }

    let third = Tensor::new(&[9u32, 9, 9, 9], &device)?.reshape((4, 1, 1))?;
    let next = model.step(&mut session, &selected, &third, None)?;
    assert_eq!(next.position(), 3);
    let logits = next.logits().expect("logits");
    let diff = logits.get(0)?.sub(&logits.get(1)?)?.abs()?.max_all()?.to_vec0::<f32>()?;
    assert!(diff < 1e-5, "siblings with identical histories and inputs must agree");
    Ok(())
}

#[test]
fn selection_composes_for_every_autoregressive_variant() -> Result<()> {
    let device = Device::Cpu;
    for kind in ["self-attention", "average-attention", "rnn"] {
        let model = small_model(kind, &device)?;
        let contexts = model.encode(&[SourceBatch::from_sentences(&[vec![1, 2], vec![3, 4, 5]], &device)?])?;
        let (mut session, state) = model.start_session(contexts)?;
        let ids = Tensor::new(&[1u32, 2, 3, 4, 5, 6], &device)?.reshape((3, 2, 1))?;
        let state = model.step(&mut session, &state, &ids, None)?;

        let first = [4usize, 1, 0, 3, 2, 5];
        let second = [4usize, 3];
        let composed: Vec<usize> = second.iter().map(|&i| first[i]).collect();
        let twice = state.select(&first, 3)?.select(&second, 1)?;
        let once = state.select(&composed, 1)?;

        for (a, b) in twice.layers().iter().zip(once.layers()) {
            let (a, b) = match (a, b) {
                (LayerState::History(a), LayerState::History(b)) => (a.clone(), b.clone()),
                (LayerState::Average(a), LayerState::Average(b)) => (a.clone(), b.clone()),
                (LayerState::Recurrent(a), LayerState::Recurrent(b)) => (a.hidden.clone(), b.hidden.clone()),
                _ => panic!("{kind}: mismatched layer states"),
            };
            assert_eq!(a.flatten_all()?.to_vec1::<f32>()?, b.flatten_all()?.to_vec1::<f32>()?);
        }
    }
    Ok(())
}
