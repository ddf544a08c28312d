//! Offline inspection of app-state patches and snapshots
//!
//! Decodes a protobuf-encoded [`SyncdPatch`] or [`SyncdSnapshot`] with a single
//! app-state key, applies it to an empty state and renders the result.

#![forbid(unsafe_code)]

use std::{collections::HashMap, fmt};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use thiserror::Error;
use wamd_core::app_state::{
    AppStateError, AppStateSyncKey, CollectionName, LtHashState, Mutation, SyncdOperation,
    SyncdPatch, SyncdSnapshot, decode_patch, decode_snapshot,
};

/// What the input file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// One `SyncdPatch`, applied on top of an empty state
    Patch,
    /// One `SyncdSnapshot`
    Snapshot,
}

/// Inspection errors
#[derive(Debug, Error)]
pub enum InspectError {
    /// Key id is not base64
    #[error("invalid key id: {0}")]
    KeyId(#[from] base64::DecodeError),

    /// Key data is not hex
    #[error("invalid key data: {0}")]
    KeyHex(#[from] hex::FromHexError),

    /// Key data has the wrong length
    #[error("key data must be 32 bytes, got {0}")]
    KeyLength(usize),

    /// Decoding or verification failed
    #[error(transparent)]
    AppState(#[from] AppStateError),
}

/// Build an app-state key from its base64 id and hex key data.
pub fn parse_key(key_id: &str, key_hex: &str) -> Result<AppStateSyncKey, InspectError> {
    let raw_id = BASE64.decode(key_id)?;
    let data = hex::decode(key_hex.trim())?;
    let key_data: [u8; 32] =
        data.as_slice().try_into().map_err(|_| InspectError::KeyLength(data.len()))?;
    Ok(AppStateSyncKey::new(&raw_id, key_data))
}

/// Decoded input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    /// Collection the input was decoded for
    pub collection: CollectionName,
    /// Resulting state
    pub state: LtHashState,
    /// Mutations sorted by canonical index
    pub mutations: Vec<(String, Mutation)>,
}

/// Decode `bytes` as `kind` for `collection` with `key`.
///
/// With `verify` off, MACs are not checked and only decryption can fail.
pub async fn inspect(
    kind: InputKind,
    bytes: &[u8],
    collection: CollectionName,
    key: AppStateSyncKey,
    verify: bool,
) -> Result<Inspection, InspectError> {
    let keys = HashMap::from([(key.key_id.clone(), key)]);

    let decoded = match kind {
        InputKind::Patch => {
            let patch = SyncdPatch::from_bytes(bytes, collection)?;
            decode_patch(&patch, collection, &LtHashState::new(), &keys, verify).await?
        }
        InputKind::Snapshot => {
            let snapshot = SyncdSnapshot::from_bytes(bytes, collection)?;
            decode_snapshot(&snapshot, collection, &keys, None, verify).await?
        }
    };

    let mut mutations: Vec<(String, Mutation)> = decoded.mutations.into_iter().collect();
    mutations.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(Inspection { collection, state: decoded.state, mutations })
}

impl fmt::Display for Inspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "collection: {}", self.collection)?;
        writeln!(f, "version:    {}", self.state.version)?;
        writeln!(f, "lthash:     {}", hex::encode(self.state.hash))?;
        writeln!(f, "entries:    {}", self.state.index_value_map.len())?;
        writeln!(f, "mutations:  {}", self.mutations.len())?;

        for (index, mutation) in &self.mutations {
            let operation = match mutation.operation {
                SyncdOperation::Set => "SET",
                SyncdOperation::Remove => "REMOVE",
            };
            writeln!(
                f,
                "  {operation:<6} {index} v{} value={}",
                mutation.api_version,
                hex::encode(&mutation.value)
            )?;
        }
        Ok(())
    }
}
