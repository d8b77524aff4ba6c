//! Error types for the ESM embedding layer.

use thiserror::Error;

/// Errors raised by the embedding layer and configuration checks.
///
/// Position-id derivation itself never fails; these cover the code around it.
#[derive(Debug, Error)]
pub enum EsmError {
    /// Configuration values are inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An input or weight tensor has the wrong shape.
    #[error("{what} shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Token id {token_id} is out of range for vocabulary of size {vocab_size}")]
    TokenOutOfRange { token_id: u32, vocab_size: usize },

    #[error("Position id {position_id} is out of range [0, {max_positions})")]
    PositionOutOfRange {
        position_id: u64,
        max_positions: usize,
    },

    /// Weight initialisation failed.
    #[error("Failed to initialise weights: {0}")]
    Init(String),
}

/// Result type for ESM operations.
pub type EsmResult<T> = Result<T, EsmError>;

impl EsmError {
    pub(crate) fn shape(what: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        EsmError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
