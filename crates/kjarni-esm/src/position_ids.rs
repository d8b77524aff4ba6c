//! Padding-aware position ids.
//!
//! ESM (like RoBERTa) reserves the low end of the position table: index
//! `padding_idx` is the padding slot and real tokens start at `padding_idx + 1`.
//! A padding token keeps `padding_idx` as its position, so it always hits the
//! zeroed padding row of the position table.
//!
//! Position ids are `u64` while token ids are `u32`: a padding id near
//! `u32::MAX` plus a long prefix still fits, so the derivation never wraps.

use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;

/// Replaces non-padding token ids with their position numbers.
///
/// Positions start at `padding_idx + 1` and count only non-padding tokens, so
/// padding in the middle of a row does not consume a position. Padding tokens
/// map to `padding_idx`. `past_key_values_length` shifts every non-padding
/// position by the length of an already processed prefix (0 for a full pass).
///
/// Rows are independent and handled in parallel. Values saturate at
/// `u64::MAX`, which only an offset close to it can reach.
pub fn create_position_ids_from_input_ids(
    input_ids: &Array2<u32>,
    padding_idx: u32,
    past_key_values_length: usize,
) -> Array2<u64> {
    let base = u64::from(padding_idx).saturating_add(past_key_values_length as u64);
    let mut position_ids = Array2::from_elem(input_ids.dim(), u64::from(padding_idx));

    position_ids
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(input_ids.axis_iter(Axis(0)))
        .for_each(|(mut positions, ids)| {
            let mut seen = 0u64;
            for (position, &token_id) in positions.iter_mut().zip(ids.iter()) {
                if token_id != padding_idx {
                    seen += 1;
                    *position = base.saturating_add(seen);
                }
            }
        });

    position_ids
}

/// Sequential position ids for a batch of precomputed embeddings.
///
/// Padding can't be observed in embedding space, so nothing is masked: every
/// row is `padding_idx + 1 ..= padding_idx + seq_len`.
pub fn create_position_ids_from_inputs_embeds<A>(
    inputs_embeds: &Array3<A>,
    padding_idx: u32,
) -> Array2<u64> {
    let (batch_size, seq_len, _) = inputs_embeds.dim();
    let first = u64::from(padding_idx) + 1;
    Array2::from_shape_fn((batch_size, seq_len), |(_, j)| first + j as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    const PAD: u32 = 1;
    const P: u64 = PAD as u64;

    #[test]
    fn test_respects_padding_index() {
        let input_ids = arr2(&[[12, 31, 13, PAD]]);
        let positions = create_position_ids_from_input_ids(&input_ids, PAD, 0);

        assert_eq!(positions.dim(), input_ids.dim());
        assert_eq!(positions, arr2(&[[P + 1, P + 2, P + 3, P]]));
    }

    #[test]
    fn test_all_padding_row() {
        let input_ids = arr2(&[[PAD, PAD, PAD]]);
        let positions = create_position_ids_from_input_ids(&input_ids, PAD, 0);
        assert_eq!(positions, arr2(&[[P, P, P]]));
    }

    #[test]
    fn test_interior_padding_does_not_consume_positions() {
        let input_ids = arr2(&[[0, PAD, 5, PAD, 6, 2]]);
        let positions = create_position_ids_from_input_ids(&input_ids, PAD, 0);
        let expected: Array2<u64> = arr2(&[[2, 1, 3, 1, 4, 5]]);
        assert_eq!(positions, expected);
    }

    #[test]
    fn test_rows_are_counted_independently() {
        let input_ids = arr2(&[[0, 4, 5, 2, PAD, PAD], [0, 7, 8, 9, 10, 2]]);
        let positions = create_position_ids_from_input_ids(&input_ids, PAD, 0);
        let expected: Array2<u64> = arr2(&[[2, 3, 4, 5, 1, 1], [2, 3, 4, 5, 6, 7]]);
        assert_eq!(positions, expected);
    }

    #[test]
    fn test_past_length_shifts_only_real_tokens() {
        let input_ids = arr2(&[[9, PAD, 9]]);
        let positions = create_position_ids_from_input_ids(&input_ids, PAD, 4);
        assert_eq!(positions, arr2(&[[P + 5, P, P + 6]]));
    }

    #[test]
    fn test_nonzero_padding_index() {
        // padding id other than the ESM default
        let pad = 7;
        let input_ids = arr2(&[[0u32, 31414, 232, 328, 2, pad]]);
        let positions = create_position_ids_from_input_ids(&input_ids, pad, 0);
        let expected: Array2<u64> = arr2(&[[8, 9, 10, 11, 12, 7]]);
        assert_eq!(positions, expected);
    }

    #[test]
    fn test_padding_id_at_u32_max() {
        let pad = u32::MAX;
        let max = u64::from(pad);

        let input_ids = arr2(&[[5u32, pad, 6]]);
        let positions = create_position_ids_from_input_ids(&input_ids, pad, 0);
        assert_eq!(positions, arr2(&[[max + 1, max, max + 2]]));

        let inputs_embeds = Array3::<f32>::zeros((1, 2, 1));
        let positions = create_position_ids_from_inputs_embeds(&inputs_embeds, pad);
        assert_eq!(positions, arr2(&[[max + 1, max + 2]]));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_past_length_beyond_u32_is_not_truncated() {
        let past = (1usize << 32) + 1;
        let input_ids = arr2(&[[9u32]]);
        let positions = create_position_ids_from_input_ids(&input_ids, PAD, past);
        assert_eq!(positions, arr2(&[[P + past as u64 + 1]]));
    }

    #[test]
    fn test_past_length_saturates() {
        let input_ids = arr2(&[[9u32, 9]]);
        let positions = create_position_ids_from_input_ids(&input_ids, PAD, usize::MAX);
        assert!(positions.iter().all(|&p| p == u64::MAX));
    }

    #[test]
    fn test_empty_sequence() {
        let input_ids = Array2::<u32>::zeros((3, 0));
        let positions = create_position_ids_from_input_ids(&input_ids, PAD, 0);
        assert_eq!(positions.dim(), (3, 0));
    }

    #[test]
    fn test_from_inputs_embeds() {
        let inputs_embeds = Array3::<f32>::zeros((2, 4, 30));
        let positions = create_position_ids_from_inputs_embeds(&inputs_embeds, PAD);

        let row = [P + 1, P + 2, P + 3, P + 4];
        assert_eq!(positions, arr2(&[row, row]));
    }
}
