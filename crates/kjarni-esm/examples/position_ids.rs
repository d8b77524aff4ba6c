//! Prints padding-aware position ids for a small padded ESM-2 batch.
//!
//! Run with `RUST_LOG=debug` to see the embedding layer's logging.

use anyhow::Result;
use kjarni_esm::prelude::*;
use kjarni_esm::utils::create_padding_mask_from_tokens;
use ndarray::arr2;

// <cls> M K T A Y <eos> followed by padding, ESM-2 vocabulary
const CLS: u32 = 0;
const PAD: u32 = 1;
const EOS: u32 = 2;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = EsmConfig::from_json(
        r#"{
            "vocab_size": 33,
            "hidden_size": 320,
            "num_attention_heads": 20,
            "num_hidden_layers": 6,
            "mask_token_id": 32,
            "pad_token_id": 1,
            "max_position_embeddings": 1026,
            "position_embedding_type": "absolute"
        }"#,
    )?;

    let input_ids = arr2(&[
        [CLS, 20, 15, 11, 5, 19, EOS],
        [CLS, 20, 15, EOS, PAD, PAD, PAD],
    ]);
    let positions = create_position_ids_from_input_ids(&input_ids, config.pad_token_id, 0);
    println!("input ids:\n{}", input_ids);
    println!("position ids:\n{}", positions);

    let embeddings = EsmEmbeddings::init(&config)?;
    let mask = create_padding_mask_from_tokens(&input_ids, embeddings.padding_idx());
    let hidden = embeddings.forward(EsmInput::Ids(&input_ids), Some(&mask), None, 0)?;
    println!("embedding output shape: {:?}", hidden.dim());

    Ok(())
}
