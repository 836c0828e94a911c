use candle_core::{Device, Tensor};
use embedding::{TokenEmbedding, TokenEmbeddingConfig};

use crate::batch::SourceBatch;
use crate::config::{EncoderKind, ResolvedOptions, TransformerConfig};
use crate::decoder::{DecodeSession, DecoderStack, DecoderState, OutputLayer};
use crate::encoder::{BiGruEncoder, Encoder, EncoderState, TransformerEncoder};
use crate::error::{ModelError, Result};
use crate::sublayer::SublayerBuilder;

/// Encoder-decoder translation model assembled from the shared crates.
#[derive(Debug)]
pub struct Transformer {
    config: TransformerConfig,
    options: ResolvedOptions,
    encoders: Vec<Box<dyn Encoder>>,
    decoder: DecoderStack,
}

impl Transformer {
    /// Validates `config` and builds the encoders, the decoder and the
    /// embedding tables shared according to the tying options.
    pub fn new(config: TransformerConfig, device: &Device) -> Result<Self> {
        let options = config.resolve()?;
        let builder = SublayerBuilder::new(&config, &options, device);

        let table = |vocab_size: usize| {
            TokenEmbedding::new(TokenEmbeddingConfig {
                vocab_size,
                hidden_dim: config.dim_emb,
                device: device.clone(),
            })
        };
        let target_table = table(config.trg_vocab())?;
        let share_source = config.tied_embeddings_all || config.tied_embeddings_src;
        let tie_output = config.tied_embeddings_all || config.tied_embeddings;

        let mut encoders: Vec<Box<dyn Encoder>> = Vec::with_capacity(config.encoders);
        for index in 0..config.encoders {
            let source_table = if share_source {
                target_table.clone()
            } else {
                table(config.src_vocab(index))?
            };
            let encoder: Box<dyn Encoder> = match options.encoder_type {
                EncoderKind::Transformer => Box::new(TransformerEncoder::build(&builder, source_table)?),
                EncoderKind::BiGru => Box::new(BiGruEncoder::build(&builder, source_table)?),
            };
            encoders.push(encoder);
        }
        let context_dims: Vec<usize> = encoders.iter().map(|encoder| encoder.context_dim()).collect();

        let mut output = if tie_output {
            OutputLayer::tied(target_table.clone())?
        } else {
            OutputLayer::untied(config.dim_emb, config.trg_vocab(), device)?
        };
        if let Some(shortlist) = &config.shortlist {
            output = output.with_shortlist(shortlist)?;
        }
        let decoder = DecoderStack::build(&builder, target_table, output, &context_dims)?;

        log::info!(
            "transformer: dim {} heads {} encoders {}x{} ({:?}) decoder {} layers, tied output {}, inference {}",
            config.dim_emb,
            config.heads,
            config.encoders,
            config.enc_depth,
            options.encoder_type,
            config.dec_depth,
            tie_output,
            config.inference
        );
        Ok(Self {
            config,
            options,
            encoders,
            decoder,
        })
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    pub fn encoders(&self) -> &[Box<dyn Encoder>] {
        &self.encoders
    }

    pub fn decoder(&self) -> &DecoderStack {
        &self.decoder
    }

    /// Encodes one batch per encoder.
    pub fn encode(&self, batches: &[SourceBatch]) -> Result<Vec<EncoderState>> {
        if batches.len() != self.encoders.len() {
            return Err(ModelError::Shape(format!(
                "model has {} encoders but {} batches were given",
                self.encoders.len(),
                batches.len()
            )));
        }
        self.encoders
            .iter()
            .zip(batches)
            .map(|(encoder, batch)| encoder.encode(batch))
            .collect()
    }

    pub fn start_session(&self, encoder_states: Vec<EncoderState>) -> Result<(DecodeSession, DecoderState)> {
        self.decoder.start(encoder_states)
    }

    /// One decoder step; see [`DecoderStack::step`].
    pub fn step(
        &self,
        session: &mut DecodeSession,
        state: &DecoderState,
        target_ids: &Tensor,
        target_mask: Option<&Tensor>,
    ) -> Result<DecoderState> {
        self.decoder.step(session, state, target_ids, target_mask)
    }
}
