//! Property tests for the app-state patch codec.
//!
//! These tests verify critical invariants:
//! - Decoding our own patches reproduces the encoder's state exactly
//! - Any flipped bit in a sealed value is caught before it is applied
//! - Snapshots resolve repeated indexes to the last write

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use wamd_core::{
    SeededEnv,
    app_state::{
        AppStateError, AppStateSyncKey, CollectionName, Decoded, LtHashState, MacKind,
        MacVerification, MutationKeys, PatchCreate, SyncdOperation, SyncdPatch, SyncdSnapshot,
        decode_patch, decode_patches, decode_snapshot, encode_key_id, encode_patch, snapshot_mac,
    },
};

const KEY_ID: &[u8] = b"\x00\x00\x00\x2a";
const COLLECTION: CollectionName = CollectionName::Regular;

fn keys() -> HashMap<String, AppStateSyncKey> {
    let key = AppStateSyncKey::new(KEY_ID, [0x11; 32]);
    HashMap::from([(key.key_id.clone(), key)])
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().build().unwrap()
}

fn create(index: u8, value: u8, operation: SyncdOperation) -> PatchCreate {
    PatchCreate {
        collection: COLLECTION,
        index: vec!["contact".to_string(), format!("{index}@s.whatsapp.net")],
        value: vec![value],
        api_version: 1,
        operation,
    }
}

async fn decode_fresh(
    patches: &[SyncdPatch],
    verify: MacVerification,
) -> Result<Decoded, AppStateError> {
    decode_patches(COLLECTION, patches, &LtHashState::new(), &keys(), None, verify).await
}

/// Encode `ops` one patch each, turning removes of dead indexes into sets.
async fn encode_all(ops: &[(u8, u8, bool)], seed: u64) -> (Vec<SyncdPatch>, LtHashState) {
    let keys = keys();
    let env = SeededEnv::new(seed);
    let mut live = HashSet::new();
    let mut state = LtHashState::new();
    let mut patches = Vec::new();

    for &(index, value, remove) in ops {
        let operation = if remove && live.contains(&index) {
            SyncdOperation::Remove
        } else {
            SyncdOperation::Set
        };
        match operation {
            SyncdOperation::Set => live.insert(index),
            SyncdOperation::Remove => live.remove(&index),
        };

        let change = create(index, value, operation);
        let encoded =
            encode_patch(&change, &encode_key_id(KEY_ID), &state, &keys, &env).await.unwrap();
        state = encoded.state;
        patches.push(encoded.patch);
    }

    (patches, state)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// INVARIANT: decode(encode(ops)) lands on the encoder's state.
    #[test]
    fn decoding_own_patches_reproduces_state(
        ops in prop::collection::vec((0u8..4, any::<u8>(), any::<bool>()), 1..12),
        seed in any::<u64>(),
    ) {
        let (decoded, expected) = runtime().block_on(async {
            let (patches, expected) = encode_all(&ops, seed).await;
            let decoded = decode_fresh(&patches, MacVerification::ALL).await.unwrap();
            (decoded, expected)
        });

        prop_assert_eq!(decoded.state.version, ops.len() as u64);
        prop_assert_eq!(decoded.state, expected);
    }

    /// INVARIANT: a flipped ciphertext bit fails the value MAC.
    #[test]
    fn flipped_ciphertext_bit_is_rejected(byte in 0usize..64, bit in 0u8..8) {
        let err = runtime().block_on(async {
            let (mut patches, _) = encode_all(&[(1, 9, false)], 3).await;
            let value = &mut patches[0].mutations[0].record.value;
            // Stay inside iv ‖ ciphertext, before the trailing MAC
            let at = byte % (value.len() - 32);
            value[at] ^= 1 << bit;

            decode_fresh(&patches, MacVerification::ALL).await.unwrap_err()
        });

        // The patch MAC covers value MACs only, so the value MAC is what trips
        prop_assert!(
            matches!(err, AppStateError::HmacMismatch { kind: MacKind::Value, version: 1, .. }),
            "unexpected error: {err:?}"
        );
    }
}

#[tokio::test]
async fn tampered_snapshot_mac_is_rejected() {
    let (mut patches, _) = encode_all(&[(1, 1, false)], 8).await;
    patches[0].snapshot_mac[5] ^= 0x80;

    // The patch MAC covers the snapshot MAC, so that check trips first
    let fresh = LtHashState::new();
    let err = decode_patch(&patches[0], COLLECTION, &fresh, &keys(), true).await.unwrap_err();
    assert!(matches!(err, AppStateError::HmacMismatch { kind: MacKind::Patch, .. }));

    let only_snapshot = MacVerification { patch: false, snapshot: true };
    let err = decode_fresh(&patches, only_snapshot).await.unwrap_err();
    assert!(matches!(err, AppStateError::HmacMismatch { kind: MacKind::Snapshot, .. }));
}

#[tokio::test]
async fn snapshot_with_repeated_index_keeps_last_write() {
    // Two sets of the same index; the second overwrites the first
    let (patches, state) = encode_all(&[(2, 1, false), (2, 2, false)], 12).await;
    let records = patches.iter().map(|patch| patch.mutations[0].record.clone()).collect();

    let mutation_keys = MutationKeys::derive(&[0x11; 32]);
    let mac = snapshot_mac(&mutation_keys.snapshot_mac_key, &state.hash, 2, COLLECTION);
    let snapshot =
        SyncdSnapshot { version: 2, records, mac: mac.to_vec(), key_id: KEY_ID.to_vec() };

    let decoded = decode_snapshot(&snapshot, COLLECTION, &keys(), None, true).await.unwrap();
    assert_eq!(decoded.state, state);
    assert_eq!(decoded.state.index_value_map.len(), 1);

    let mutation = &decoded.mutations[r#"["contact","2@s.whatsapp.net"]"#];
    assert_eq!(mutation.value, vec![2]);
}
