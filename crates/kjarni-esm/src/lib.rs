//! ESM protein language model embeddings.
//!
//! Padding-aware position ids and the embedding layer that consumes them.
//! The encoder stack, heads and weight loading live elsewhere.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod normalization;
pub mod position_ids;
pub mod utils;

pub use crate::{
    config::{EsmConfig, PositionEmbeddingType},
    embeddings::{EsmEmbeddings, EsmInput},
    error::{EsmError, EsmResult},
    normalization::LayerNorm,
    position_ids::{create_position_ids_from_input_ids, create_position_ids_from_inputs_embeds},
};

pub mod prelude {
    pub use crate::config::{EsmConfig, PositionEmbeddingType};
    pub use crate::embeddings::{EsmEmbeddings, EsmInput};
    pub use crate::position_ids::{
        create_position_ids_from_input_ids, create_position_ids_from_inputs_embeds,
    };
}
