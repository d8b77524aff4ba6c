pub mod masks;

pub use masks::{apply_hidden_mask, create_padding_mask_from_tokens, sequence_lengths};
