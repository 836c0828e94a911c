//! Decoder stack and its incremental decoding state machine.
//!
//! [`DecoderStack::start`] opens a [`DecodeSession`] (owning the
//! cross-attention cache) together with an empty [`DecoderState`] at
//! position 0. Each [`DecoderStack::step`] consumes a state and returns a new
//! one whose position has advanced by the number of target positions fed in.
//! Between steps a beam search may call [`DecoderState::select`] to reorder
//! hypotheses.

pub mod output;
pub mod session;
pub mod state;

use std::collections::BTreeMap;

use attention::{AdditiveMask, CacheKey};
use candle_core::Tensor;
use embedding::TokenEmbedding;

pub use output::OutputLayer;
pub use session::DecodeSession;
pub use state::{expand_time_indices, select_history, DecoderState};

use crate::autoregressive::AutoregressiveLayer;
use crate::config::AutoregressiveKind;
use crate::embed::ScaledEmbedding;
use crate::encoder::EncoderState;
use crate::error::{ModelError, Result};
use crate::sublayer::{AttentionSublayer, FeedForwardSublayer, SublayerBuilder};

#[derive(Debug, Clone)]
struct DecoderLayer {
    autoregressive: AutoregressiveLayer,
    /// One cross-attention block per encoder context.
    cross_attention: Vec<AttentionSublayer>,
    ffn: FeedForwardSublayer,
}

#[derive(Debug, Clone)]
pub struct DecoderStack {
    embedding: ScaledEmbedding,
    /// Distinct parameter layers.
    layers: Vec<DecoderLayer>,
    /// Parameter layer used at each depth.
    layer_map: Vec<usize>,
    output: OutputLayer,
    context_dims: Vec<usize>,
    dim: usize,
}

impl DecoderStack {
    /// Builds `dec_depth` layers attending to encoders of the given context
    /// widths, honouring `tied_layers`.
    pub(crate) fn build(
        builder: &SublayerBuilder<'_>,
        table: TokenEmbedding,
        output: OutputLayer,
        context_dims: &[usize],
    ) -> Result<Self> {
        let config = builder.config;
        let depth = config.dec_depth;
        let tied: Vec<usize> = if config.tied_layers.is_empty() {
            (0..depth).collect()
        } else {
            if config.tied_layers.len() != depth {
                return Err(ModelError::Config(vec![format!(
                    "specified layer tying for {} layers, but decoder has {} layers",
                    config.tied_layers.len(),
                    depth
                )]));
            }
            config.tied_layers.iter().map(|&layer| layer.saturating_sub(1)).collect()
        };

        let mut params: BTreeMap<usize, usize> = BTreeMap::new();
        let mut layers = Vec::new();
        let mut layer_map = Vec::with_capacity(depth);
        for source in tied {
            let index = match params.get(&source) {
                Some(&index) => index,
                None => {
                    layers.push(DecoderLayer {
                        autoregressive: AutoregressiveLayer::build(builder.options.decoder_autoreg, builder)?,
                        cross_attention: context_dims
                            .iter()
                            .map(|&kv_dim| builder.attention(kv_dim))
                            .collect::<Result<Vec<_>>>()?,
                        ffn: builder.feed_forward()?,
                    });
                    params.insert(source, layers.len() - 1);
                    layers.len() - 1
                }
            };
            layer_map.push(index);
        }

        log::info!(
            "decoder stack: depth {depth}, {} parameter layers, {} autoregression, {} encoder(s)",
            layers.len(),
            builder.options.decoder_autoreg,
            context_dims.len()
        );
        Ok(Self {
            embedding: ScaledEmbedding::build(builder, table, config.dropout_trg)?,
            layers,
            layer_map,
            output,
            context_dims: context_dims.to_vec(),
            dim: config.dim_emb,
        })
    }

    pub fn depth(&self) -> usize {
        self.layer_map.len()
    }

    /// Number of distinct parameter layers after tying.
    pub fn parameter_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn autoregressive_kind(&self) -> Option<AutoregressiveKind> {
        self.layers.first().map(|layer| layer.autoregressive.kind())
    }

    pub fn embedding(&self) -> &ScaledEmbedding {
        &self.embedding
    }

    pub fn output(&self) -> &OutputLayer {
        &self.output
    }

    /// Capacity of a session cache: one entry per parameter layer and encoder.
    pub fn cache_capacity(&self) -> usize {
        self.layers.len() * self.context_dims.len()
    }

    /// Opens a session over fixed encoder contexts.
    pub fn start(&self, encoder_states: Vec<EncoderState>) -> Result<(DecodeSession, DecoderState)> {
        if encoder_states.len() != self.context_dims.len() {
            return Err(ModelError::Shape(format!(
                "decoder expects {} encoder contexts, got {}",
                self.context_dims.len(),
                encoder_states.len()
            )));
        }
        let batch = encoder_states.first().map(EncoderState::batch_size).unwrap_or(0);
        for (index, (state, &dim)) in encoder_states.iter().zip(&self.context_dims).enumerate() {
            if state.batch_size() != batch || state.dim() != dim {
                return Err(ModelError::Shape(format!(
                    "encoder context {index} is {:?}, expected batch {batch} and width {dim}",
                    state.context().dims()
                )));
            }
        }

        let session = DecodeSession::new(self.layers.len(), self.context_dims.len());
        let state = DecoderState::start(session.id(), encoder_states, batch);
        Ok((session, state))
    }

    /// Decodes target ids shaped `(batch, q)` or `(beam, batch, q)`.
    ///
    /// `target_mask`, if given, is `(batch, q)` or `(beam, batch, q)` and marks
    /// padded target positions with 0.
    pub fn step(
        &self,
        session: &mut DecodeSession,
        state: &DecoderState,
        target_ids: &Tensor,
        target_mask: Option<&Tensor>,
    ) -> Result<DecoderState> {
        let ids = match target_ids.rank() {
            2 => target_ids.unsqueeze(0)?,
            3 => target_ids.clone(),
            _ => {
                return Err(ModelError::Shape(format!(
                    "target ids must be (batch, q) or (beam, batch, q), got {:?}",
                    target_ids.dims()
                )))
            }
        };
        let embedded = self.embedding.lookup(&ids)?;
        self.step_embedded(session, state, &embedded, target_mask)
    }

    /// Decodes unscaled target embeddings shaped `(beam, batch, q, dim)`.
    pub fn step_embedded(
        &self,
        session: &mut DecodeSession,
        state: &DecoderState,
        embeddings: &Tensor,
        target_mask: Option<&Tensor>,
    ) -> Result<DecoderState> {
        session.check(state)?;
        let (beam, batch, q_len, dim) = embeddings.dims4()?;
        if batch != state.batch_size() || dim != self.dim || q_len == 0 {
            return Err(ModelError::Shape(format!(
                "target embeddings {:?} do not fit batch {} and width {}",
                embeddings.dims(),
                state.batch_size(),
                self.dim
            )));
        }
        if !state.layers().is_empty() && beam != state.beam_size() {
            return Err(ModelError::Shape(format!(
                "step has beam {beam} but the state carries beam {}",
                state.beam_size()
            )));
        }
        log::trace!(
            "decode step: session {} position {} beam {beam} batch {batch} len {q_len}",
            session.id(),
            state.position()
        );

        let masks = state
            .encoder_states()
            .iter()
            .map(EncoderState::additive_mask)
            .collect::<Result<Vec<AdditiveMask>>>()?;

        let mut hidden = self.embedding.encode_positions(embeddings, state.position())?;
        let mut layer_states = Vec::with_capacity(self.layer_map.len());
        for (depth, &index) in self.layer_map.iter().enumerate() {
            let layer = &self.layers[index];
            let (output, layer_state) = layer.autoregressive.forward(
                &hidden,
                state.layers().get(depth),
                target_mask,
                state.position(),
            )?;
            hidden = output;
            for (encoder, (cross, context)) in layer.cross_attention.iter().zip(state.encoder_states()).enumerate() {
                hidden = cross.forward_cached(
                    &hidden,
                    context.context(),
                    Some(&masks[encoder]),
                    session.cache_mut(),
                    CacheKey::new(index, encoder),
                )?;
            }
            hidden = layer.ffn.forward(&hidden)?;
            layer_states.push(layer_state);
        }

        Ok(DecoderState {
            layers: layer_states,
            logits: Some(self.output.forward(&hidden)?),
            encoder_states: state.encoder_states.clone(),
            position: state.position() + q_len,
            session: state.session_id(),
            batch,
        })
    }
}
