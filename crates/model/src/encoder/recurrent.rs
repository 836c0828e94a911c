//! Bidirectional GRU encoder.
//!
//! A forward and a backward GRU run over the embedded batch. At padded
//! positions the carried state is left untouched, so the backward pass of a
//! short sentence starts from zeros at its last real token. Both directions
//! are concatenated per position and padded positions are zeroed.

use candle_core::{DType, Tensor};
use candle_nn::rnn::{gru, GRUConfig, GRUState, GRU, RNN};
use candle_nn::{VarBuilder, VarMap};
use embedding::TokenEmbedding;
use layers::Dropout;

use super::{Encoder, EncoderState};
use crate::batch::SourceBatch;
use crate::error::Result;
use crate::sublayer::SublayerBuilder;

#[derive(Debug, Clone)]
pub struct BiGruEncoder {
    table: TokenEmbedding,
    word_dropout: Dropout,
    forward: GRU,
    backward: GRU,
    state_dim: usize,
}

impl BiGruEncoder {
    pub(crate) fn build(builder: &SublayerBuilder<'_>, table: TokenEmbedding) -> Result<Self> {
        let config = builder.config;
        let input_dim = table.config().hidden_dim;
        let state_dim = config.enc_state_dim;
        let params = VarMap::new();
        let vb = VarBuilder::from_varmap(&params, DType::F32, builder.device);
        Ok(Self {
            word_dropout: builder.dropout(config.dropout_src),
            forward: gru(input_dim, state_dim, GRUConfig::default(), vb.pp("bi"))?,
            backward: gru(input_dim, state_dim, GRUConfig::default(), vb.pp("bi_r"))?,
            state_dim,
            table,
        })
    }

    /// Runs `cell` over time in the given order, returning one state per position.
    fn run(&self, cell: &GRU, embedded: &Tensor, mask: &Tensor, reverse: bool) -> Result<Vec<Tensor>> {
        let (batch, len, _) = embedded.dims3()?;
        let mut state = cell.zero_state(batch)?.h;
        let mut outputs = vec![None; len];
        let order: Box<dyn Iterator<Item = usize>> = if reverse {
            Box::new((0..len).rev())
        } else {
            Box::new(0..len)
        };
        for t in order {
            let input = embedded.narrow(1, t, 1)?.squeeze(1)?;
            let next = cell.step(&input, &GRUState { h: state.clone() })?.h;
            let keep = mask.narrow(1, t, 1)?;
            let carry = keep.affine(-1.0, 1.0)?;
            state = next.broadcast_mul(&keep)?.add(&state.broadcast_mul(&carry)?)?;
            outputs[t] = Some(state.clone());
        }
        Ok(outputs.into_iter().flatten().collect())
    }
}

impl Encoder for BiGruEncoder {
    fn encode(&self, batch: &SourceBatch) -> Result<EncoderState> {
        let embedded = self.table.forward(batch.ids())?;
        let len = batch.max_len();
        let embedded = self.word_dropout.forward_with_noise_shape(&embedded, &[1, len, 1])?;
        let mask = batch.mask();

        let forward = Tensor::stack(&self.run(&self.forward, &embedded, mask, false)?, 1)?;
        let backward = Tensor::stack(&self.run(&self.backward, &embedded, mask, true)?, 1)?;
        let context = Tensor::cat(&[&forward, &backward], 2)?
            .broadcast_mul(&mask.unsqueeze(2)?)?
            .unsqueeze(0)?;
        EncoderState::new(context, mask.clone())
    }

    fn context_dim(&self) -> usize {
        2 * self.state_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransformerConfig;
    use candle_core::Device;
    use embedding::TokenEmbeddingConfig;

    fn encoder(device: &Device) -> Result<BiGruEncoder> {
        let config = TransformerConfig {
            dim_emb: 6,
            heads: 2,
            dim_vocabs: vec![20, 20],
            enc_state_dim: 5,
            encoder_type: "bi-gru".into(),
            inference: true,
            ..TransformerConfig::default()
        };
        let options = config.resolve()?;
        let builder = SublayerBuilder::new(&config, &options, device);
        let table = TokenEmbedding::new(TokenEmbeddingConfig {
            vocab_size: 20,
            hidden_dim: 6,
            device: device.clone(),
        })?;
        BiGruEncoder::build(&builder, table)
    }

    #[test]
    fn context_concatenates_both_directions() -> Result<()> {
        let device = Device::Cpu;
        let encoder = encoder(&device)?;
        let batch = SourceBatch::from_sentences(&[vec![1, 2, 3], vec![4, 5, 6, 7]], &device)?;
        let state = encoder.encode(&batch)?;
        assert_eq!(state.context().dims(), &[1, 2, 4, 10]);
        assert_eq!(encoder.context_dim(), 10);
        assert_eq!(state.valid_positions()?, vec![3, 4]);
        let padded = state.context().get(0)?.get(0)?.get(3)?;
        assert_eq!(padded.abs()?.sum_all()?.to_vec0::<f32>()?, 0.0);
        Ok(())
    }

    #[test]
    fn padding_does_not_change_real_positions() -> Result<()> {
        let device = Device::Cpu;
        let encoder = encoder(&device)?;
        let alone = encoder.encode(&SourceBatch::from_sentences(&[vec![1, 2, 3]], &device)?)?;
        let padded = encoder.encode(&SourceBatch::from_sentences(&[vec![1, 2, 3], vec![4, 5, 6, 7, 8]], &device)?)?;
        let expected = alone.context().get(0)?.get(0)?;
        let actual = padded.context().get(0)?.get(0)?.narrow(0, 0, 3)?;
        let diff = expected.sub(&actual)?.abs()?.max_all()?.to_vec0::<f32>()?;
        assert!(diff < 1e-5);
        Ok(())
    }
}
