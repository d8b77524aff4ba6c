use anyhow::Result;
use kjarni_esm::prelude::*;
use kjarni_esm::utils::create_padding_mask_from_tokens;
use ndarray::{arr2, Array2, Array3, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

const TESTER_CONFIG: &str = r#"{
    "vocab_size": 99,
    "hidden_size": 32,
    "num_hidden_layers": 5,
    "num_attention_heads": 4,
    "intermediate_size": 37,
    "hidden_act": "gelu",
    "hidden_dropout_prob": 0.1,
    "attention_probs_dropout_prob": 0.1,
    "max_position_embeddings": 512,
    "type_vocab_size": 16,
    "initializer_range": 0.02
}"#;

/// Small vocab so that padding shows up often.
fn random_ids(batch_size: usize, seq_len: usize) -> Array2<u32> {
    Array2::random((batch_size, seq_len), Uniform::new(0u32, 5))
}

#[test]
fn padding_passes_through_and_real_tokens_count_up() {
    for pad in [0u32, 1, 3] {
        let input_ids = random_ids(16, 40);
        let positions = create_position_ids_from_input_ids(&input_ids, pad, 0);
        assert_eq!(positions.dim(), input_ids.dim());

        for (ids, pos) in input_ids.axis_iter(Axis(0)).zip(positions.axis_iter(Axis(0))) {
            let mut expected_next = u64::from(pad) + 1;
            for (&id, &p) in ids.iter().zip(pos.iter()) {
                if id == pad {
                    assert_eq!(p, u64::from(pad));
                } else {
                    assert_eq!(p, expected_next);
                    expected_next += 1;
                }
            }
        }
    }
}

#[test]
fn derivation_is_deterministic() {
    let input_ids = random_ids(8, 64);
    let first = create_position_ids_from_input_ids(&input_ids, 1, 0);
    let second = create_position_ids_from_input_ids(&input_ids, 1, 0);
    assert_eq!(first, second);
}

#[test]
fn scenarios() {
    let pad = 1u32;
    let p = u64::from(pad);

    let positions = create_position_ids_from_input_ids(&arr2(&[[12, 31, 13, pad]]), pad, 0);
    assert_eq!(positions, arr2(&[[p + 1, p + 2, p + 3, p]]));

    let positions = create_position_ids_from_input_ids(&arr2(&[[pad, pad, pad]]), pad, 0);
    assert_eq!(positions, arr2(&[[p, p, p]]));

    let embeds = Array3::<f32>::zeros((2, 4, 8));
    let positions = create_position_ids_from_inputs_embeds(&embeds, pad);
    assert_eq!(
        positions,
        arr2(&[[p + 1, p + 2, p + 3, p + 4], [p + 1, p + 2, p + 3, p + 4]])
    );
}

#[test]
fn embeds_variant_ignores_padding_layout() {
    let embeds = Array3::<f32>::zeros((3, 5, 4));
    let positions = create_position_ids_from_inputs_embeds(&embeds, 1);
    for row in positions.axis_iter(Axis(0)) {
        assert_eq!(row.to_vec(), vec![2u64, 3, 4, 5, 6]);
    }
}

#[test]
fn large_padding_id_does_not_overflow() {
    let pad = u32::MAX;
    let input_ids = arr2(&[[5u32, pad, 6, 7]]);
    let positions = create_position_ids_from_input_ids(&input_ids, pad, 0);

    let p = u64::from(pad);
    assert_eq!(positions, arr2(&[[p + 1, p, p + 2, p + 3]]));
}

#[test]
fn tester_model_embeddings() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let config = EsmConfig::from_json(TESTER_CONFIG)?;
    assert_eq!(config.pad_token_id, 1);
    assert_eq!(config.position_embedding_type, PositionEmbeddingType::Absolute);

    let embeddings = EsmEmbeddings::init(&config)?;
    let input_ids = Array2::random((13, 7), Uniform::new(0u32, config.vocab_size as u32));
    let mask = create_padding_mask_from_tokens(&input_ids, embeddings.padding_idx());

    let hidden = embeddings.forward(EsmInput::Ids(&input_ids), Some(&mask), None, 0)?;
    assert_eq!(hidden.dim(), (13, 7, config.hidden_size));

    let positions = embeddings.position_ids(EsmInput::Ids(&input_ids), None, 0)?;
    assert!(positions.iter().all(|&p| (p as usize) < config.max_position_embeddings));
    Ok(())
}
