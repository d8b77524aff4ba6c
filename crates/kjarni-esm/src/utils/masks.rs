use ndarray::{Array1, Array2, Array3, Axis, Zip};

use crate::error::{EsmError, EsmResult};

/// Create a padding mask from token IDs
///
/// Marks positions with pad_token_id as 0.0, others as 1.0
/// Returns [batch_size, seq_len]
pub fn create_padding_mask_from_tokens(token_ids: &Array2<u32>, pad_token_id: u32) -> Array2<f32> {
    token_ids.mapv(|id| if id == pad_token_id { 0.0 } else { 1.0 })
}

/// Number of real tokens in each row of an attention mask.
pub fn sequence_lengths(attention_mask: &Array2<f32>) -> Array1<f32> {
    attention_mask.sum_axis(Axis(1))
}

/// Zero the hidden vectors of masked-out positions.
///
/// `hidden` is [batch, seq_len, hidden_size], `mask` is [batch, seq_len].
pub fn apply_hidden_mask(hidden: &mut Array3<f32>, mask: &Array2<f32>) -> EsmResult<()> {
    let (batch_size, seq_len, _) = hidden.dim();
    if mask.dim() != (batch_size, seq_len) {
        return Err(EsmError::shape(
            "attention_mask",
            &[batch_size, seq_len],
            mask.shape(),
        ));
    }

    // [batch, seq_len] -> [batch, seq_len, 1]
    let mask_expanded = mask.view().insert_axis(Axis(2));
    Zip::from(hidden)
        .and_broadcast(&mask_expanded)
        .for_each(|h, &m| *h *= m);

    Ok(())
}
