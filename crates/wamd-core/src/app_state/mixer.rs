use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use wamd_crypto::{limits::LT_HASH_SIZE, lthash};

use super::{AppStateError, CollectionName, LtHashState, SyncdOperation};

/// Accumulates mutations against a copy of an [`LtHashState`].
///
/// The caller's state is never touched; [`LtHashMixer::finish`] hands back
/// the new hash and map, leaving the version to the caller.
#[derive(Debug)]
pub struct LtHashMixer {
    collection: CollectionName,
    hash: [u8; LT_HASH_SIZE],
    index_value_map: HashMap<[u8; 32], [u8; 32]>,
    added: Vec<[u8; 32]>,
    removed: Vec<[u8; 32]>,
}

impl LtHashMixer {
    /// Start from `state`'s hash and map.
    pub fn new(collection: CollectionName, state: &LtHashState) -> Self {
        Self {
            collection,
            hash: state.hash,
            index_value_map: state.index_value_map.clone(),
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Apply one mutation to the working map and queue its hash deltas.
    ///
    /// A SET queues its value MAC for addition. Any value it replaces, or a
    /// REMOVE deletes, is queued for subtraction.
    ///
    /// # Errors
    ///
    /// - `MissingPreviousValue` for a REMOVE of an index with no live value
    pub fn mix(
        &mut self,
        index_mac: [u8; 32],
        value_mac: [u8; 32],
        operation: SyncdOperation,
    ) -> Result<(), AppStateError> {
        let previous = match operation {
            SyncdOperation::Remove => {
                let Some(previous) = self.index_value_map.remove(&index_mac) else {
                    return Err(AppStateError::MissingPreviousValue {
                        collection: self.collection,
                        index_mac: BASE64.encode(index_mac),
                    });
                };
                Some(previous)
            }
            SyncdOperation::Set => {
                self.added.push(value_mac);
                self.index_value_map.insert(index_mac, value_mac)
            }
        };

        if let Some(previous) = previous {
            self.removed.push(previous);
        }
        Ok(())
    }

    /// Apply the queued deltas: subtract first, then add.
    pub fn finish(self) -> ([u8; LT_HASH_SIZE], HashMap<[u8; 32], [u8; 32]>) {
        let hash = lthash::subtract_then_add(&self.hash, &self.added, &self.removed);
        (hash, self.index_value_map)
    }
}
