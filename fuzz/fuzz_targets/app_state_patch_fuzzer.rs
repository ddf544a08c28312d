//! Fuzz target for app-state patch decoding
//!
//! # Strategy
//!
//! - Random bytes decoded as a protobuf patch and applied
//! - Valid encoded patch with arbitrary byte flips in any field
//!
//! # Invariants
//!
//! - Decoding never panics
//! - With MAC verification on, a modified patch is either rejected or
//!   yields exactly the encoder's state
//! - The input state is never modified

#![no_main]

use std::collections::HashMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use wamd_core::{
    SeededEnv,
    app_state::{
        AppStateSyncKey, CollectionName, LtHashState, PatchCreate, SyncdOperation, SyncdPatch,
        decode_patch, encode_patch,
    },
};

const COLLECTION: CollectionName = CollectionName::RegularHigh;

#[derive(Debug, Clone, Arbitrary)]
enum Input {
    RandomBytes { bytes: Vec<u8> },
    Flipped { index: Vec<String>, value: Vec<u8>, seed: u64, flips: Vec<(u16, u8)> },
}

fn keys() -> HashMap<String, AppStateSyncKey> {
    let key = AppStateSyncKey::new(b"\x00\x01", [3; 32]);
    HashMap::from([(key.key_id.clone(), key)])
}

fuzz_target!(|input: Input| {
    let Ok(runtime) = tokio::runtime::Builder::new_current_thread().build() else {
        return;
    };
    let keys = keys();
    let empty = LtHashState::new();

    runtime.block_on(async {
        match input {
            Input::RandomBytes { bytes } => {
                if let Ok(patch) = SyncdPatch::from_bytes(&bytes, COLLECTION) {
                    let _ = decode_patch(&patch, COLLECTION, &empty, &keys, true).await;
                    let _ = decode_patch(&patch, COLLECTION, &empty, &keys, false).await;
                }
            }

            Input::Flipped { index, value, seed, flips } => {
                let create = PatchCreate {
                    collection: COLLECTION,
                    index,
                    value,
                    api_version: 1,
                    operation: SyncdOperation::Set,
                };
                let key_id = keys.keys().next().cloned().unwrap_or_default();
                let Ok(encoded) =
                    encode_patch(&create, &key_id, &empty, &keys, &SeededEnv::new(seed)).await
                else {
                    return;
                };
                let mut bytes = encoded.patch.to_bytes();
                for (at, mask) in flips {
                    let at = at as usize % bytes.len();
                    bytes[at] ^= mask;
                }

                let Ok(patch) = SyncdPatch::from_bytes(&bytes, COLLECTION) else {
                    return;
                };
                if let Ok(decoded) = decode_patch(&patch, COLLECTION, &empty, &keys, true).await {
                    assert_eq!(decoded.state, encoded.state);
                }
            }
        }
    });

    assert_eq!(empty, LtHashState::new());
});
