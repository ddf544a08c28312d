use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use wamd_crypto::{EMPTY_LT_HASH, limits::LT_HASH_SIZE};

use super::CollectionName;
use crate::store::{KeyNamespace, KeyStore, StoreError, Transaction};

/// Integrity state of one collection.
///
/// # Invariants
///
/// - `hash` is the LTHash of exactly the value MACs in `index_value_map`
/// - At most one value MAC per index MAC
/// - `version` only moves forward, except for a reset to a fresh state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredLtHashState", into = "StoredLtHashState")]
pub struct LtHashState {
    /// Version of the last applied patch or snapshot
    pub version: u64,
    /// 128-byte LTHash accumulator
    pub hash: [u8; LT_HASH_SIZE],
    /// Live value MAC per index MAC
    pub index_value_map: HashMap<[u8; 32], [u8; 32]>,
}

impl LtHashState {
    /// Version 0, empty hash, no entries.
    pub fn new() -> Self {
        Self { version: 0, hash: EMPTY_LT_HASH, index_value_map: HashMap::new() }
    }

    /// Live value MAC for `index_mac`.
    pub fn value_mac(&self, index_mac: &[u8; 32]) -> Option<&[u8; 32]> {
        self.index_value_map.get(index_mac)
    }

    /// Base64 index MACs, sorted. For logs and debugging output.
    pub fn index_macs_base64(&self) -> Vec<String> {
        let mut macs: Vec<String> =
            self.index_value_map.keys().map(|mac| BASE64.encode(mac)).collect();
        macs.sort();
        macs
    }
}

impl Default for LtHashState {
    fn default() -> Self {
        Self::new()
    }
}

// Arrays over 32 bytes have no serde impls and maps with byte keys do not
// survive every format, so storage uses plain vectors.
#[derive(Serialize, Deserialize)]
struct StoredLtHashState {
    version: u64,
    hash: Vec<u8>,
    index_value_map: Vec<([u8; 32], [u8; 32])>,
}

impl TryFrom<StoredLtHashState> for LtHashState {
    type Error = String;

    fn try_from(stored: StoredLtHashState) -> Result<Self, Self::Error> {
        let hash: [u8; LT_HASH_SIZE] = stored
            .hash
            .try_into()
            .map_err(|bytes: Vec<u8>| {
                format!("LTHash must be {LT_HASH_SIZE} bytes, got {}", bytes.len())
            })?;

        Ok(Self {
            version: stored.version,
            hash,
            index_value_map: stored.index_value_map.into_iter().collect(),
        })
    }
}

impl From<LtHashState> for StoredLtHashState {
    fn from(state: LtHashState) -> Self {
        let mut index_value_map: Vec<_> = state.index_value_map.into_iter().collect();
        index_value_map.sort_unstable();
        Self { version: state.version, hash: state.hash.to_vec(), index_value_map }
    }
}

/// Load a collection's state inside a transaction. `None` if never synced.
pub async fn load_lt_hash_state<S: KeyStore>(
    tx: &Transaction<S>,
    collection: CollectionName,
) -> Result<Option<LtHashState>, StoreError> {
    tx.load(KeyNamespace::AppStateVersion, collection.as_str()).await
}

/// Buffer a collection's new state; `None` resets it.
pub fn store_lt_hash_state<S: KeyStore>(
    tx: &mut Transaction<S>,
    collection: CollectionName,
    state: Option<&LtHashState>,
) -> Result<(), StoreError> {
    match state {
        Some(state) => tx.store(KeyNamespace::AppStateVersion, collection.as_str(), state),
        None => {
            tx.delete(KeyNamespace::AppStateVersion, collection.as_str());
            Ok(())
        }
    }
}
