//! The ESM embedding layer.
//!
//! Word lookup, ESM token-dropout compensation, learned absolute position
//! embeddings, the optional embedding layer norm and attention-mask zeroing.
//! Dropout is left to the encoder that consumes the output.

use std::ops::AddAssign;

use ndarray::{s, Array2, Array3, Axis};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rayon::prelude::*;

use crate::config::{EsmConfig, PositionEmbeddingType};
use crate::error::{EsmError, EsmResult};
use crate::normalization::LayerNorm;
use crate::position_ids::{
    create_position_ids_from_input_ids, create_position_ids_from_inputs_embeds,
};
use crate::utils::masks::{apply_hidden_mask, sequence_lengths};


/// Masking ratio ESM was trained with (15% selected, 80% of those masked).
pub const MASK_RATIO_TRAIN: f32 = 0.15 * 0.8;

/// Input to the embedding layer: discrete token ids or precomputed vectors.
#[derive(Debug, Clone, Copy)]
pub enum EsmInput<'a> {
    Ids(&'a Array2<u32>),
    Embeds(&'a Array3<f32>),
}

impl EsmInput<'_> {
    /// (batch_size, seq_len)
    pub fn dims(&self) -> (usize, usize) {
        match self {
            EsmInput::Ids(ids) => ids.dim(),
            EsmInput::Embeds(embeds) => {
                let (batch_size, seq_len, _) = embeds.dim();
                (batch_size, seq_len)
            }
        }
    }
}

pub struct EsmEmbeddings {
    /// [vocab_size, hidden_size]
    pub word_embeddings: Array2<f32>,
    /// [max_position_embeddings, hidden_size], only for absolute positions.
    pub position_embeddings: Option<Array2<f32>>,
    pub position_embedding_type: PositionEmbeddingType,
    /// Present when `emb_layer_norm_before` is set; runs before masking.
    pub layer_norm: Option<LayerNorm>,
    padding_idx: u32,
    mask_token_id: Option<u32>,
    token_dropout: bool,
}

impl EsmEmbeddings {
    /// Builds the layer from existing tables, checking them against `config`.
    pub fn new(
        config: &EsmConfig,
        word_embeddings: Array2<f32>,
        position_embeddings: Option<Array2<f32>>,
    ) -> EsmResult<Self> {
        config.validate()?;

        let expected_words = [config.vocab_size, config.hidden_size];
        if word_embeddings.dim() != (config.vocab_size, config.hidden_size) {
            return Err(EsmError::shape(
                "word_embeddings",
                &expected_words,
                word_embeddings.shape(),
            ));
        }

        let learned = config.position_embedding_type.has_learned_table();
        let position_embeddings = match (learned, position_embeddings) {
            (true, Some(table)) => {
                let expected = [config.max_position_embeddings, config.hidden_size];
                if table.dim() != (expected[0], expected[1]) {
                    return Err(EsmError::shape("position_embeddings", &expected, table.shape()));
                }
                Some(table)
            }
            (true, None) => {
                return Err(EsmError::InvalidConfig(
                    "absolute position embeddings require a position table".into(),
                ));
            }
            (false, Some(_)) => {
                log::warn!(
                    "Ignoring position table for {:?} position embeddings",
                    config.position_embedding_type
                );
                None
            }
            (false, None) => None,
        };

        let token_dropout = if config.token_dropout && config.mask_token_id.is_none() {
            log::warn!("token_dropout is set but mask_token_id is missing, disabling token dropout");
            false
        } else {
            config.token_dropout
        };

        let layer_norm = (config.emb_layer_norm_before == Some(true))
            .then(|| LayerNorm::identity(config.hidden_size, config.layer_norm_eps));

        Ok(Self {
            word_embeddings,
            position_embeddings,
            position_embedding_type: config.position_embedding_type,
            layer_norm,
            padding_idx: config.pad_token_id,
            mask_token_id: config.mask_token_id,
            token_dropout,
        })
    }

    /// Replaces the embedding layer norm parameters.
    ///
    /// Only valid when the config enabled `emb_layer_norm_before`.
    pub fn with_layer_norm(mut self, layer_norm: LayerNorm) -> EsmResult<Self> {
        if self.layer_norm.is_none() {
            return Err(EsmError::InvalidConfig(
                "layer norm weights given but emb_layer_norm_before is not set".into(),
            ));
        }
        if layer_norm.hidden_size() != self.hidden_size() {
            return Err(EsmError::shape(
                "layer_norm.weight",
                &[self.hidden_size()],
                layer_norm.weight.shape(),
            ));
        }
        self.layer_norm = Some(layer_norm);
        Ok(self)
    }

    /// All-zero tables of the configured shapes.
    pub fn zeros(config: &EsmConfig) -> EsmResult<Self> {
        let words = Array2::zeros((config.vocab_size, config.hidden_size));
        let positions = config
            .position_embedding_type
            .has_learned_table()
            .then(|| Array2::zeros((config.max_position_embeddings, config.hidden_size)));
        Self::new(config, words, positions)
    }

    /// Randomly initialised tables, N(0, initializer_range), with the padding
    /// row of each table set to zero.
    pub fn init(config: &EsmConfig) -> EsmResult<Self> {
        config.validate()?;
        let dist = Normal::new(0.0f32, config.initializer_range)
            .map_err(|e| EsmError::Init(e.to_string()))?;
        let pad = config.pad_token_id as usize;

        let mut words = Array2::random((config.vocab_size, config.hidden_size), dist);
        words.row_mut(pad).fill(0.0);

        let positions = if config.position_embedding_type.has_learned_table() {
            let mut table =
                Array2::random((config.max_position_embeddings, config.hidden_size), dist);
            table.row_mut(pad).fill(0.0);
            Some(table)
        } else {
            None
        };

        log::info!(
            "Initialised ESM embeddings: vocab={}, hidden={}, positions={:?}",
            config.vocab_size,
            config.hidden_size,
            config.position_embedding_type
        );
        Self::new(config, words, positions)
    }

    pub fn padding_idx(&self) -> u32 {
        self.padding_idx
    }

    pub fn vocab_size(&self) -> usize {
        self.word_embeddings.shape()[0]
    }

    pub fn hidden_size(&self) -> usize {
        self.word_embeddings.shape()[1]
    }

    pub fn max_positions(&self) -> Option<usize> {
        self.position_embeddings.as_ref().map(|t| t.shape()[0])
    }

    /// Position ids for `input`: the caller's if given, derived otherwise.
    ///
    /// Token ids get padding-aware positions; embeddings get plain sequential
    /// positions since their padding can't be seen.
    pub fn position_ids(
        &self,
        input: EsmInput<'_>,
        position_ids: Option<&Array2<u64>>,
        past_key_values_length: usize,
    ) -> EsmResult<Array2<u64>> {
        let (batch_size, seq_len) = input.dims();

        if let Some(ids) = position_ids {
            if ids.dim() != (batch_size, seq_len) {
                return Err(EsmError::shape("position_ids", &[batch_size, seq_len], ids.shape()));
            }
            return Ok(ids.clone());
        }

        Ok(match input {
            EsmInput::Ids(input_ids) => create_position_ids_from_input_ids(
                input_ids,
                self.padding_idx,
                past_key_values_length,
            ),
            EsmInput::Embeds(inputs_embeds) => {
                create_position_ids_from_inputs_embeds(inputs_embeds, self.padding_idx)
            }
        })
    }

    /// Runs the embedding layer.
    ///
    /// Returns [batch_size, seq_len, hidden_size].
    pub fn forward(
        &self,
        input: EsmInput<'_>,
        attention_mask: Option<&Array2<f32>>,
        position_ids: Option<&Array2<u64>>,
        past_key_values_length: usize,
    ) -> EsmResult<Array3<f32>> {
        let (batch_size, seq_len) = input.dims();
        if let Some(mask) = attention_mask {
            if mask.dim() != (batch_size, seq_len) {
                return Err(EsmError::shape("attention_mask", &[batch_size, seq_len], mask.shape()));
            }
        }

        let mut hidden = match input {
            EsmInput::Ids(input_ids) => self.word_lookup(input_ids)?,
            EsmInput::Embeds(inputs_embeds) => {
                let hidden_size = inputs_embeds.dim().2;
                if hidden_size != self.hidden_size() {
                    return Err(EsmError::shape(
                        "inputs_embeds",
                        &[batch_size, seq_len, self.hidden_size()],
                        inputs_embeds.shape(),
                    ));
                }
                inputs_embeds.clone()
            }
        };

        if let (true, Some(mask_id), EsmInput::Ids(input_ids)) =
            (self.token_dropout, self.mask_token_id, input)
        {
            self.apply_token_dropout(&mut hidden, input_ids, mask_id, attention_mask);
        }

        if let Some(ref table) = self.position_embeddings {
            let positions = self.position_ids(input, position_ids, past_key_values_length)?;
            log::debug!("Adding absolute position embeddings for {:?}", positions.dim());
            add_position_embeddings(&mut hidden, &positions, table)?;
        }

        if let Some(ref layer_norm) = self.layer_norm {
            hidden = layer_norm.forward(&hidden)?;
        }

        if let Some(mask) = attention_mask {
            apply_hidden_mask(&mut hidden, mask)?;
        }

        Ok(hidden)
    }

    fn word_lookup(&self, input_ids: &Array2<u32>) -> EsmResult<Array3<f32>> {
        let vocab_size = self.vocab_size();
        if let Some(&token_id) = input_ids.iter().find(|&&id| id as usize >= vocab_size) {
            return Err(EsmError::TokenOutOfRange {
                token_id,
                vocab_size,
            });
        }

        let (batch_size, seq_len) = input_ids.dim();
        let mut hidden = Array3::<f32>::zeros((batch_size, seq_len, self.hidden_size()));
        hidden
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(input_ids.axis_iter(Axis(0)))
            .for_each(|(mut hidden_slice, ids)| {
                for (j, &token_id) in ids.iter().enumerate() {
                    hidden_slice
                        .slice_mut(s![j, ..])
                        .assign(&self.word_embeddings.row(token_id as usize));
                }
            });
        Ok(hidden)
    }

    /// Zeroes the vectors of mask tokens and rescales each row so its expected
    /// magnitude matches training, where `MASK_RATIO_TRAIN` of tokens were masked.
    fn apply_token_dropout(
        &self,
        hidden: &mut Array3<f32>,
        input_ids: &Array2<u32>,
        mask_token_id: u32,
        attention_mask: Option<&Array2<f32>>,
    ) {
        let seq_len = input_ids.ncols() as f32;
        let src_lengths: Vec<f32> = match attention_mask {
            Some(mask) => sequence_lengths(mask).to_vec(),
            None => vec![seq_len; input_ids.nrows()],
        };

        hidden
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(input_ids.axis_iter(Axis(0)))
            .zip(src_lengths.par_iter())
            .for_each(|((mut hidden_slice, ids), &src_len)| {
                let mut masked = 0usize;
                for (j, &token_id) in ids.iter().enumerate() {
                    if token_id == mask_token_id {
                        hidden_slice.slice_mut(s![j, ..]).fill(0.0);
                        masked += 1;
                    }
                }

                let observed = if src_len > 0.0 {
                    masked as f32 / src_len
                } else {
                    0.0
                };
                // a row of nothing but mask tokens is already all zeros
                if observed < 1.0 {
                    let scale = (1.0 - MASK_RATIO_TRAIN) / (1.0 - observed);
                    hidden_slice.mapv_inplace(|x| x * scale);
                }
            });
    }
}

/// Adds `table[position_ids[b, j]]` to `hidden[b, j, ..]`.
fn add_position_embeddings(
    hidden: &mut Array3<f32>,
    position_ids: &Array2<u64>,
    table: &Array2<f32>,
) -> EsmResult<()> {
    let max_positions = table.nrows();
    if let Some(&position_id) = position_ids
        .iter()
        .find(|&&id| id >= max_positions as u64)
    {
        return Err(EsmError::PositionOutOfRange {
            position_id,
            max_positions,
        });
    }

    hidden
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(position_ids.axis_iter(Axis(0)))
        .for_each(|(mut hidden_slice, positions)| {
            for (j, &position_id) in positions.iter().enumerate() {
                hidden_slice
                    .slice_mut(s![j, ..])
                    .add_assign(&table.row(position_id as usize));
            }
        });
    Ok(())
}
