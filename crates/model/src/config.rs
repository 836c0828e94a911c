//! Configuration surface of the translation model.
//!
//! [`TransformerConfig`] mirrors the option names of the command-line
//! surface it is read from and keeps enum-like options as strings so that
//! every invalid value can be reported at once. [`TransformerConfig::resolve`]
//! turns the strings into closed enums exactly once, at construction time.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use layers::{ActivationKind, Dropout, ProcessSequence, ProcessStage};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Autoregressive sublayer used by every decoder layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoregressiveKind {
    SelfAttention,
    AverageAttention,
    Rnn,
}

impl FromStr for AutoregressiveKind {
    type Err = String;

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name {
            "self-attention" => Ok(Self::SelfAttention),
            "average-attention" => Ok(Self::AverageAttention),
            "rnn" => Ok(Self::Rnn),
            other => Err(format!("unknown auto-regressive layer type '{other}'")),
        }
    }
}

impl fmt::Display for AutoregressiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SelfAttention => "self-attention",
            Self::AverageAttention => "average-attention",
            Self::Rnn => "rnn",
        })
    }
}

/// Recurrent cell of the `rnn` autoregressive variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrentCellKind {
    Gru,
    Lstm,
}

impl FromStr for RecurrentCellKind {
    type Err = String;

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name {
            "gru" => Ok(Self::Gru),
            "lstm" => Ok(Self::Lstm),
            other => Err(format!("unknown recurrent cell '{other}'")),
        }
    }
}

/// Source encoder architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Transformer,
    BiGru,
}

impl FromStr for EncoderKind {
    type Err = String;

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name {
            "transformer" => Ok(Self::Transformer),
            "bi-gru" => Ok(Self::BiGru),
            other => Err(format!("unknown encoder type '{other}'")),
        }
    }
}

/// Options after parsing every string-valued setting.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    pub ffn_activation: ActivationKind,
    pub aan_activation: ActivationKind,
    pub preprocess: ProcessSequence,
    pub postprocess: ProcessSequence,
    pub postprocess_emb: ProcessSequence,
    pub decoder_autoreg: AutoregressiveKind,
    pub dec_cell: RecurrentCellKind,
    pub encoder_type: EncoderKind,
}

/// Model hyper-parameters, deserialised from TOML or JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformerConfig {
    pub dim_emb: usize,
    /// Vocabulary sizes, source vocabularies first and the target last.
    pub dim_vocabs: Vec<usize>,
    pub enc_depth: usize,
    pub dec_depth: usize,
    pub heads: usize,
    pub dim_ffn: usize,
    pub ffn_depth: usize,
    pub ffn_activation: String,
    pub dim_aan: usize,
    pub aan_depth: usize,
    pub aan_activation: String,
    pub aan_nogate: bool,
    /// Dropout used by the pre/post-process wrappers.
    pub dropout: f32,
    pub dropout_attention: f32,
    pub dropout_ffn: f32,
    /// Recurrent dropout; one mask per sequence on the cell input and state.
    pub dropout_rnn: f32,
    /// Source word dropout.
    pub dropout_src: f32,
    /// Target word dropout.
    pub dropout_trg: f32,
    pub preprocess: String,
    pub postprocess: String,
    pub postprocess_emb: String,
    pub decoder_autoreg: String,
    pub dec_cell: String,
    pub encoder_type: String,
    pub enc_state_dim: usize,
    /// 1-based parameter layer used by each decoder layer.
    pub tied_layers: Vec<usize>,
    pub tied_embeddings: bool,
    pub tied_embeddings_src: bool,
    pub tied_embeddings_all: bool,
    pub no_projection: bool,
    pub encoders: usize,
    pub shortlist: Option<Vec<u32>>,
    pub inference: bool,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            dim_emb: 512,
            dim_vocabs: vec![32_000, 32_000],
            enc_depth: 6,
            dec_depth: 6,
            heads: 8,
            dim_ffn: 2048,
            ffn_depth: 2,
            ffn_activation: "swish".into(),
            dim_aan: 2048,
            aan_depth: 2,
            aan_activation: "swish".into(),
            aan_nogate: false,
            dropout: 0.0,
            dropout_attention: 0.0,
            dropout_ffn: 0.0,
            dropout_rnn: 0.0,
            dropout_src: 0.0,
            dropout_trg: 0.0,
            preprocess: String::new(),
            postprocess: "dan".into(),
            postprocess_emb: "d".into(),
            decoder_autoreg: "self-attention".into(),
            dec_cell: "gru".into(),
            encoder_type: "transformer".into(),
            enc_state_dim: 512,
            tied_layers: Vec::new(),
            tied_embeddings: false,
            tied_embeddings_src: false,
            tied_embeddings_all: false,
            no_projection: false,
            encoders: 1,
            shortlist: None,
            inference: false,
        }
    }
}

impl TransformerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|err| ModelError::ConfigFormat(err.to_string()))
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(|err| ModelError::ConfigFormat(err.to_string()))
    }

    /// Loads a `.json` file as JSON and anything else as TOML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json_str(&source)
        } else {
            Self::from_toml_str(&source)
        }
    }

    /// Source vocabulary size of encoder `index`.
    pub fn src_vocab(&self, index: usize) -> usize {
        self.dim_vocabs.get(index).copied().unwrap_or(0)
    }

    /// Target vocabulary size (the last entry of `dim_vocabs`).
    pub fn trg_vocab(&self) -> usize {
        self.dim_vocabs.last().copied().unwrap_or(0)
    }

    /// Dropout probability in effect; always zero at inference.
    pub fn effective_dropout(&self, probability: f32) -> f32 {
        if self.inference {
            0.0
        } else {
            probability
        }
    }

    /// Dropout layer for `probability`, disabled at inference.
    pub fn dropout_layer(&self, probability: f32) -> Dropout {
        Dropout::new(self.effective_dropout(probability))
    }

    /// Checks every option, reporting all violations together.
    pub fn validate(&self) -> Result<()> {
        self.resolve().map(|_| ())
    }

    /// Validates the configuration and parses its string-valued options.
    pub fn resolve(&self) -> Result<ResolvedOptions> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("dim_emb", self.dim_emb),
            ("enc_depth", self.enc_depth),
            ("dec_depth", self.dec_depth),
            ("heads", self.heads),
            ("dim_ffn", self.dim_ffn),
            ("dim_aan", self.dim_aan),
            ("encoders", self.encoders),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be greater than zero"));
            }
        }
        if self.heads > 0 && self.dim_emb % self.heads != 0 {
            errors.push(format!(
                "dim_emb ({}) must be divisible by heads ({})",
                self.dim_emb, self.heads
            ));
        }
        for (name, depth) in [("ffn_depth", self.ffn_depth), ("aan_depth", self.aan_depth)] {
            if depth < 1 {
                errors.push(format!("{name} {depth} is smaller than 1"));
            }
        }
        for (name, p) in [
            ("dropout", self.dropout),
            ("dropout_attention", self.dropout_attention),
            ("dropout_ffn", self.dropout_ffn),
            ("dropout_rnn", self.dropout_rnn),
            ("dropout_src", self.dropout_src),
            ("dropout_trg", self.dropout_trg),
        ] {
            if !(0.0..1.0).contains(&p) {
                errors.push(format!("{name} must be in [0, 1), got {p}"));
            }
        }

        if self.dim_vocabs.len() < self.encoders + 1 {
            errors.push(format!(
                "dim_vocabs needs {} entries ({} source + target), got {}",
                self.encoders + 1,
                self.encoders,
                self.dim_vocabs.len()
            ));
        } else if self.dim_vocabs.iter().any(|&v| v == 0) {
            errors.push("dim_vocabs entries must be greater than zero".to_string());
        } else if self.tied_embeddings_src || self.tied_embeddings_all {
            let target = self.trg_vocab();
            if (0..self.encoders).any(|i| self.src_vocab(i) != target) {
                errors.push(format!(
                    "tied source embeddings require equal vocabularies, got {:?}",
                    self.dim_vocabs
                ));
            }
        }

        if !self.tied_layers.is_empty() {
            if self.tied_layers.len() != self.dec_depth {
                errors.push(format!(
                    "specified layer tying for {} layers, but decoder has {} layers",
                    self.tied_layers.len(),
                    self.dec_depth
                ));
            }
            if let Some(bad) = self
                .tied_layers
                .iter()
                .find(|&&layer| layer == 0 || layer > self.dec_depth)
            {
                errors.push(format!(
                    "tied layer {bad} is outside 1..={}",
                    self.dec_depth
                ));
            }
        }

        if let Some(shortlist) = &self.shortlist {
            let target = self.trg_vocab() as u32;
            if shortlist.is_empty() {
                errors.push("shortlist must not be empty".to_string());
            } else if let Some(bad) = shortlist.iter().find(|&&id| id >= target) {
                errors.push(format!("shortlist id {bad} exceeds target vocabulary {target}"));
            }
        }

        let ffn_activation = collect(&mut errors, self.ffn_activation.parse::<ActivationKind>());
        let aan_activation = collect(&mut errors, self.aan_activation.parse::<ActivationKind>());
        let preprocess = collect(&mut errors, ProcessSequence::parse(&self.preprocess, ProcessStage::Pre));
        let postprocess = collect(&mut errors, ProcessSequence::parse(&self.postprocess, ProcessStage::Post));
        let postprocess_emb = collect(
            &mut errors,
            ProcessSequence::parse(&self.postprocess_emb, ProcessStage::Pre),
        );
        let decoder_autoreg = collect(&mut errors, self.decoder_autoreg.parse::<AutoregressiveKind>());
        let dec_cell = collect(&mut errors, self.dec_cell.parse::<RecurrentCellKind>());
        let encoder_type = collect(&mut errors, self.encoder_type.parse::<EncoderKind>());

        if encoder_type == Some(EncoderKind::BiGru) && self.enc_state_dim == 0 {
            errors.push("enc_state_dim must be greater than zero".to_string());
        }

        match (
            ffn_activation,
            aan_activation,
            preprocess,
            postprocess,
            postprocess_emb,
            decoder_autoreg,
            dec_cell,
            encoder_type,
        ) {
            (
                Some(ffn_activation),
                Some(aan_activation),
                Some(preprocess),
                Some(postprocess),
                Some(postprocess_emb),
                Some(decoder_autoreg),
                Some(dec_cell),
                Some(encoder_type),
            ) if errors.is_empty() => Ok(ResolvedOptions {
                ffn_activation,
                aan_activation,
                preprocess,
                postprocess,
                postprocess_emb,
                decoder_autoreg,
                dec_cell,
                encoder_type,
            }),
            _ => Err(ModelError::Config(errors)),
        }
    }
}

fn collect<T, E: ToString>(errors: &mut Vec<String>, parsed: std::result::Result<T, E>) -> Option<T> {
    match parsed {
        Ok(value) => Some(value),
        Err(err) => {
            errors.push(err.to_string());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &TransformerConfig) -> Vec<String> {
        match config.validate() {
            Err(ModelError::Config(messages)) => messages,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let resolved = TransformerConfig::default().resolve().unwrap();
        assert_eq!(resolved.decoder_autoreg, AutoregressiveKind::SelfAttention);
        assert_eq!(resolved.ffn_activation, ActivationKind::Swish);
        assert!(resolved.preprocess.is_empty());
        assert_eq!(resolved.postprocess.ops().len(), 3);
    }

    #[test]
    fn all_violations_are_reported_together() {
        let config = TransformerConfig {
            ffn_activation: "gelu".into(),
            postprocess: "dax".into(),
            decoder_autoreg: "lstm".into(),
            ffn_depth: 0,
            ..TransformerConfig::default()
        };
        let messages = messages(&config);
        assert_eq!(messages.len(), 4, "{messages:?}");
        assert!(messages.iter().any(|m| m.contains("invalid activation name 'gelu'")));
        assert!(messages.iter().any(|m| m.contains("'x'")));
        assert!(messages.iter().any(|m| m.contains("auto-regressive")));
        assert!(messages.iter().any(|m| m.contains("ffn_depth 0 is smaller than 1")));
    }

    #[test]
    fn tying_list_must_match_depth() {
        let config = TransformerConfig {
            dec_depth: 3,
            tied_layers: vec![1, 1],
            ..TransformerConfig::default()
        };
        assert!(messages(&config)[0].contains("specified layer tying for 2 layers"));

        let config = TransformerConfig {
            dec_depth: 2,
            tied_layers: vec![1, 3],
            ..TransformerConfig::default()
        };
        assert!(messages(&config)[0].contains("outside 1..=2"));
    }

    #[test]
    fn pre_process_rejects_residual_symbols() {
        let config = TransformerConfig {
            preprocess: "a".into(),
            ..TransformerConfig::default()
        };
        assert_eq!(messages(&config).len(), 1);
    }

    #[test]
    fn source_tying_requires_equal_vocabularies() {
        let config = TransformerConfig {
            dim_vocabs: vec![100, 200],
            tied_embeddings_src: true,
            ..TransformerConfig::default()
        };
        assert!(messages(&config)[0].contains("equal vocabularies"));
    }

    #[test]
    fn inference_disables_dropout() {
        let config = TransformerConfig {
            dropout: 0.3,
            inference: true,
            ..TransformerConfig::default()
        };
        assert_eq!(config.effective_dropout(config.dropout), 0.0);
        assert_eq!(config.dropout_layer(config.dropout).probability(), 0.0);
    }

    #[test]
    fn toml_and_json_agree() {
        let toml = r#"
            dim_emb = 16
            heads = 2
            dim_vocabs = [10, 12]
            decoder_autoreg = "average-attention"
        "#;
        let json = r#"{"dim_emb": 16, "heads": 2, "dim_vocabs": [10, 12], "decoder_autoreg": "average-attention"}"#;
        let from_toml = TransformerConfig::from_toml_str(toml).unwrap();
        let from_json = TransformerConfig::from_json_str(json).unwrap();
        assert_eq!(from_toml, from_json);
        assert_eq!(from_toml.trg_vocab(), 12);
        assert_eq!(from_toml.ffn_depth, 2);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = TransformerConfig::from_toml_str("dim_embedding = 4").unwrap_err();
        assert!(matches!(err, ModelError::ConfigFormat(_)));
    }
}
