//! ESM model configuration, as found in a Hugging Face `config.json`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{EsmError, EsmResult};

/// How position information enters the model.
///
/// Only `Absolute` uses a learned table in the embedding layer. The relative
/// and rotary variants act inside attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionEmbeddingType {
    #[default]
    Absolute,
    RelativeKey,
    RelativeKeyQuery,
    Rotary,
}

impl PositionEmbeddingType {
    pub fn has_learned_table(&self) -> bool {
        matches!(self, PositionEmbeddingType::Absolute)
    }
}

fn default_hidden_size() -> usize {
    768
}
fn default_num_hidden_layers() -> usize {
    12
}
fn default_num_attention_heads() -> usize {
    12
}
fn default_intermediate_size() -> usize {
    3072
}
fn default_hidden_act() -> String {
    "gelu".to_string()
}
fn default_dropout() -> f32 {
    0.1
}
fn default_max_position_embeddings() -> usize {
    1026
}
fn default_initializer_range() -> f32 {
    0.02
}
fn default_layer_norm_eps() -> f32 {
    1e-12
}
fn default_pad_token_id() -> u32 {
    1
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsmConfig {
    pub vocab_size: usize,

    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    #[serde(default = "default_num_hidden_layers")]
    pub num_hidden_layers: usize,
    #[serde(default = "default_num_attention_heads")]
    pub num_attention_heads: usize,
    #[serde(default = "default_intermediate_size")]
    pub intermediate_size: usize,
    #[serde(default = "default_hidden_act", alias = "activation_function")]
    pub hidden_act: String,

    #[serde(default = "default_dropout")]
    pub hidden_dropout_prob: f32,
    #[serde(default = "default_dropout")]
    pub attention_probs_dropout_prob: f32,

    #[serde(default = "default_max_position_embeddings")]
    pub max_position_embeddings: usize,
    #[serde(default = "default_initializer_range")]
    pub initializer_range: f32,
    #[serde(default = "default_layer_norm_eps", alias = "layer_norm_epsilon")]
    pub layer_norm_eps: f32,

    #[serde(default)]
    pub position_embedding_type: PositionEmbeddingType,

    /// Padding token; also the padding slot of the position table.
    #[serde(default = "default_pad_token_id")]
    pub pad_token_id: u32,
    #[serde(default)]
    pub mask_token_id: Option<u32>,
    #[serde(default)]
    pub token_dropout: bool,
    #[serde(default)]
    pub emb_layer_norm_before: Option<bool>,

    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default = "default_true")]
    pub tie_word_embeddings: bool,
}

impl EsmConfig {
    /// Default ESM configuration for the given vocabulary size.
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            hidden_size: default_hidden_size(),
            num_hidden_layers: default_num_hidden_layers(),
            num_attention_heads: default_num_attention_heads(),
            intermediate_size: default_intermediate_size(),
            hidden_act: default_hidden_act(),
            hidden_dropout_prob: default_dropout(),
            attention_probs_dropout_prob: default_dropout(),
            max_position_embeddings: default_max_position_embeddings(),
            initializer_range: default_initializer_range(),
            layer_norm_eps: default_layer_norm_eps(),
            position_embedding_type: PositionEmbeddingType::default(),
            pad_token_id: default_pad_token_id(),
            mask_token_id: None,
            token_dropout: false,
            emb_layer_norm_before: None,
            use_cache: true,
            tie_word_embeddings: true,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse ESM config.json")?;
        config.validate()?;
        log::debug!(
            "Parsed ESM config: vocab={}, hidden={}, layers={}, positions={:?}",
            config.vocab_size,
            config.hidden_size,
            config.num_hidden_layers,
            config.position_embedding_type
        );
        Ok(config)
    }

    pub fn validate(&self) -> EsmResult<()> {
        if self.vocab_size == 0 {
            return Err(EsmError::InvalidConfig("vocab_size must be > 0".into()));
        }
        if self.num_attention_heads == 0 || self.hidden_size % self.num_attention_heads != 0 {
            return Err(EsmError::InvalidConfig(format!(
                "hidden_size {} is not divisible by num_attention_heads {}",
                self.hidden_size, self.num_attention_heads
            )));
        }
        if self.pad_token_id as usize >= self.vocab_size {
            return Err(EsmError::InvalidConfig(format!(
                "pad_token_id {} is outside vocabulary of size {}",
                self.pad_token_id, self.vocab_size
            )));
        }
        if let Some(mask) = self.mask_token_id {
            if mask as usize >= self.vocab_size {
                return Err(EsmError::InvalidConfig(format!(
                    "mask_token_id {} is outside vocabulary of size {}",
                    mask, self.vocab_size
                )));
            }
        }
        if self.position_embedding_type.has_learned_table()
            && self.max_position_embeddings <= self.pad_token_id as usize + 1
        {
            return Err(EsmError::InvalidConfig(format!(
                "max_position_embeddings {} leaves no room after padding offset {}",
                self.max_position_embeddings,
                self.pad_token_id + 1
            )));
        }
        Ok(())
    }

    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// Longest sequence the learned position table can address.
    ///
    /// Positions `0..=pad_token_id` are reserved, so the usable range is
    /// shorter than `max_position_embeddings`. `None` when there is no table.
    pub fn max_sequence_length(&self) -> Option<usize> {
        if self.position_embedding_type.has_learned_table() {
            Some(
                self.max_position_embeddings
                    .saturating_sub(self.pad_token_id as usize + 1),
            )
        } else {
            None
        }
    }
}
