use std::collections::{HashMap, hash_map::Entry};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use wamd_crypto::primitives::{aes_cbc_decrypt_prefixed, aes_cbc_encrypt_prefixed};

use super::{
    AppStateError, CollectionName, KeyLookup, LtHashMixer, LtHashState, MacKind, MutationKeys,
    SyncActionData, SyncdMutation, SyncdOperation, SyncdPatch, SyncdRecord, SyncdSnapshot,
    keys::encode_key_id,
    mac::{canonical_index, index_mac, macs_equal, parse_index, patch_mac, snapshot_mac, value_mac},
};
use crate::env::Environment;

/// A local change to encode into a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchCreate {
    /// Target collection
    pub collection: CollectionName,
    /// Logical index, e.g. `["mute", "<jid>"]`
    pub index: Vec<String>,
    /// Opaque action value
    pub value: Vec<u8>,
    /// Action API version
    pub api_version: u32,
    /// Set or remove
    pub operation: SyncdOperation,
}

/// A decoded, authenticated mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Set or remove
    pub operation: SyncdOperation,
    /// Logical index
    pub index: Vec<String>,
    /// Opaque action value
    pub value: Vec<u8>,
    /// Action API version
    pub api_version: u32,
    /// HMAC of the canonical index
    pub index_mac: [u8; 32],
    /// HMAC of the encrypted value
    pub value_mac: [u8; 32],
}

/// Mutations keyed by canonical index string. Later mutations win.
pub type MutationMap = HashMap<String, Mutation>;

/// Result of [`encode_patch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPatch {
    /// Patch to push to the server
    pub patch: SyncdPatch,
    /// State after applying the patch locally
    pub state: LtHashState,
    /// The mutation the patch carries
    pub mutation: Mutation,
}

/// Result of decoding patches or a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// New collection state
    pub state: LtHashState,
    /// Mutations surfaced to the caller
    pub mutations: MutationMap,
}

/// Which MACs to check while decoding.
///
/// `patch` covers the patch MAC and every mutation's value and index MACs;
/// `snapshot` covers the snapshot MAC recomputed from the resulting LTHash.
/// Disable only when replaying data that was already verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacVerification {
    /// Verify patch, value and index MACs
    pub patch: bool,
    /// Verify the snapshot MAC
    pub snapshot: bool,
}

impl MacVerification {
    /// Verify everything.
    pub const ALL: Self = Self { patch: true, snapshot: true };

    /// Verify nothing.
    pub const NONE: Self = Self { patch: false, snapshot: false };

    fn from_flag(validate_macs: bool) -> Self {
        if validate_macs { Self::ALL } else { Self::NONE }
    }
}

impl Default for MacVerification {
    fn default() -> Self {
        Self::ALL
    }
}

/// Encrypt one local change into a patch on top of `prior`.
///
/// `prior` is not modified; the returned state is at `prior.version + 1`.
///
/// # Errors
///
/// - `KeyNotFound` if `key_id` is unknown
/// - `MissingPreviousValue` when removing an index with no live value
/// - `Malformed` if `prior` is already at `u64::MAX`
pub async fn encode_patch<L, E>(
    create: &PatchCreate,
    key_id: &str,
    prior: &LtHashState,
    lookup: &L,
    env: &E,
) -> Result<EncodedPatch, AppStateError>
where
    L: KeyLookup,
    E: Environment,
{
    let collection = create.collection;
    let Some(sync_key) = lookup.app_state_sync_key(key_id).await? else {
        return Err(AppStateError::KeyNotFound { key_id: key_id.to_string(), collection });
    };
    let raw_key_id = BASE64
        .decode(key_id)
        .map_err(|e| AppStateError::Malformed { collection, reason: format!("key id: {e}") })?;
    let keys = MutationKeys::derive(&sync_key.key_data);

    let index_bytes = canonical_index(&create.index);
    let action = SyncActionData {
        index: index_bytes.clone(),
        value: create.value.clone(),
        padding: Vec::new(),
        version: create.api_version,
    };
    let plaintext = action.to_bytes();

    let iv = env.random_array();
    let encrypted = aes_cbc_encrypt_prefixed(&keys.value_encryption_key, iv, &plaintext)
        .map_err(|source| AppStateError::Crypto { collection, source })?;
    let value_mac = value_mac(&keys.value_mac_key, create.operation, &raw_key_id, &encrypted);
    let index_mac = index_mac(&keys.index_key, &index_bytes);

    let mut mixer = LtHashMixer::new(collection, prior);
    mixer.mix(index_mac, value_mac, create.operation)?;
    let (hash, index_value_map) = mixer.finish();
    let Some(version) = prior.version.checked_add(1) else {
        let reason = format!("version {} cannot advance", prior.version);
        return Err(AppStateError::Malformed { collection, reason });
    };
    let state = LtHashState { version, hash, index_value_map };

    let snapshot_mac = snapshot_mac(&keys.snapshot_mac_key, &state.hash, version, collection);
    let patch_mac =
        patch_mac(&keys.patch_mac_key, &snapshot_mac, [value_mac.as_slice()], version, collection);

    let mut value = encrypted;
    value.extend_from_slice(&value_mac);

    let patch = SyncdPatch {
        version,
        mutations: vec![SyncdMutation {
            operation: create.operation,
            record: SyncdRecord { index: index_mac.to_vec(), value, key_id: raw_key_id.clone() },
        }],
        snapshot_mac: snapshot_mac.to_vec(),
        patch_mac: patch_mac.to_vec(),
        key_id: raw_key_id,
    };

    debug!(%collection, version, operation = ?create.operation, "encoded patch");

    Ok(EncodedPatch {
        patch,
        state,
        mutation: Mutation {
            operation: create.operation,
            index: create.index.clone(),
            value: create.value.clone(),
            api_version: create.api_version,
            index_mac,
            value_mac,
        },
    })
}

/// Authenticate and apply one patch on top of `prior`.
///
/// Nothing is applied unless every check passes; `prior` is never modified.
///
/// # Errors
///
/// - `KeyNotFound` if a referenced key is unknown
/// - `HmacMismatch` for a bad patch, value, index or snapshot MAC
/// - `MissingPreviousValue` for a REMOVE of a dead index
pub async fn decode_patch<L: KeyLookup>(
    patch: &SyncdPatch,
    collection: CollectionName,
    prior: &LtHashState,
    lookup: &L,
    validate_macs: bool,
) -> Result<Decoded, AppStateError> {
    let mut keys = KeyCache::new(lookup, collection);
    let mut mutations = MutationMap::new();

    let verify = MacVerification::from_flag(validate_macs);
    let state =
        apply_patch(patch, collection, prior, &mut keys, verify, Some(&mut mutations)).await?;

    Ok(Decoded { state, mutations })
}

/// Apply a batch of patches in order.
///
/// Mutations are surfaced only for patches newer than `minimum_version`, so
/// rebuilding a collection from scratch does not report changes the caller
/// has already seen.
pub async fn decode_patches<L: KeyLookup>(
    collection: CollectionName,
    patches: &[SyncdPatch],
    prior: &LtHashState,
    lookup: &L,
    minimum_version: Option<u64>,
    verify: MacVerification,
) -> Result<Decoded, AppStateError> {
    let mut keys = KeyCache::new(lookup, collection);
    let mut mutations = MutationMap::new();
    let mut state = prior.clone();

    for patch in patches {
        let surface = minimum_version.is_none_or(|minimum| patch.version > minimum);
        let sink = if surface { Some(&mut mutations) } else { None };
        state = apply_patch(patch, collection, &state, &mut keys, verify, sink).await?;
    }

    debug!(
        %collection,
        version = state.version,
        patches = patches.len(),
        mutations = mutations.len(),
        "decoded patches"
    );
    Ok(Decoded { state, mutations })
}

/// Rebuild a collection from a snapshot.
///
/// Every record is an implicit SET. Mutations are surfaced only when the
/// snapshot is newer than `minimum_version`.
pub async fn decode_snapshot<L: KeyLookup>(
    snapshot: &SyncdSnapshot,
    collection: CollectionName,
    lookup: &L,
    minimum_version: Option<u64>,
    validate_macs: bool,
) -> Result<Decoded, AppStateError> {
    let mut keys = KeyCache::new(lookup, collection);
    let mut mutations = MutationMap::new();
    let version = snapshot.version;

    let surface = minimum_version.is_none_or(|minimum| version > minimum);
    let (hash, index_value_map) = decode_records(
        snapshot.records.iter().map(|record| (SyncdOperation::Set, record)),
        collection,
        version,
        &LtHashState::new(),
        &mut keys,
        validate_macs,
        surface.then_some(&mut mutations),
    )
    .await?;
    let state = LtHashState { version, hash, index_value_map };

    if validate_macs {
        let snapshot_keys = keys.get(&snapshot.key_id).await?;
        let expected =
            snapshot_mac(&snapshot_keys.snapshot_mac_key, &state.hash, version, collection);
        if !macs_equal(&expected, &snapshot.mac) {
            return Err(mismatch(MacKind::Snapshot, collection, version));
        }
    }

    debug!(%collection, version, records = snapshot.records.len(), "decoded snapshot");
    Ok(Decoded { state, mutations })
}

async fn apply_patch<L: KeyLookup>(
    patch: &SyncdPatch,
    collection: CollectionName,
    prior: &LtHashState,
    keys: &mut KeyCache<'_, L>,
    verify: MacVerification,
    mutations: Option<&mut MutationMap>,
) -> Result<LtHashState, AppStateError> {
    let version = patch.version;

    if verify.patch {
        let value_macs = patch
            .mutations
            .iter()
            .map(|mutation| mutation.record.split_value().map(|(_, mac)| mac))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| AppStateError::Malformed {
                collection,
                reason: "value shorter than its MAC".into(),
            })?;

        let patch_keys = keys.get(&patch.key_id).await?;
        let expected = patch_mac(
            &patch_keys.patch_mac_key,
            &patch.snapshot_mac,
            value_macs,
            version,
            collection,
        );
        if !macs_equal(&expected, &patch.patch_mac) {
            return Err(mismatch(MacKind::Patch, collection, version));
        }
    }

    let (hash, index_value_map) = decode_records(
        patch.mutations.iter().map(|mutation| (mutation.operation, &mutation.record)),
        collection,
        version,
        prior,
        keys,
        verify.patch,
        mutations,
    )
    .await?;
    let state = LtHashState { version, hash, index_value_map };

    if verify.snapshot {
        let patch_keys = keys.get(&patch.key_id).await?;
        let expected =
            snapshot_mac(&patch_keys.snapshot_mac_key, &state.hash, version, collection);
        if !macs_equal(&expected, &patch.snapshot_mac) {
            return Err(mismatch(MacKind::Snapshot, collection, version));
        }
    }

    trace!(%collection, version, mutations = patch.mutations.len(), "applied patch");
    Ok(state)
}

async fn decode_records<'r, L, I>(
    records: I,
    collection: CollectionName,
    version: u64,
    prior: &LtHashState,
    keys: &mut KeyCache<'_, L>,
    validate_macs: bool,
    mut mutations: Option<&mut MutationMap>,
) -> Result<([u8; 128], HashMap<[u8; 32], [u8; 32]>), AppStateError>
where
    L: KeyLookup,
    I: Iterator<Item = (SyncdOperation, &'r SyncdRecord)> + Send,
{
    let malformed =
        |reason: &str| AppStateError::Malformed { collection, reason: reason.to_string() };
    let mut mixer = LtHashMixer::new(collection, prior);

    for (operation, record) in records {
        let mutation_keys = keys.get(&record.key_id).await?;
        let Some((encrypted, mac)) = record.split_value() else {
            return Err(malformed("value shorter than its MAC"));
        };

        if validate_macs {
            let expected =
                value_mac(&mutation_keys.value_mac_key, operation, &record.key_id, encrypted);
            if !macs_equal(&expected, mac) {
                return Err(mismatch(MacKind::Value, collection, version));
            }
        }

        let plaintext = aes_cbc_decrypt_prefixed(&mutation_keys.value_encryption_key, encrypted)
            .map_err(|source| AppStateError::Crypto { collection, source })?;
        let action = SyncActionData::from_bytes(&plaintext, collection)?;

        if validate_macs
            && !macs_equal(&index_mac(&mutation_keys.index_key, &action.index), &record.index)
        {
            return Err(mismatch(MacKind::Index, collection, version));
        }

        let index_mac: [u8; 32] = record
            .index
            .as_slice()
            .try_into()
            .map_err(|_| malformed("index MAC is not 32 bytes"))?;
        let value_mac: [u8; 32] =
            mac.try_into().map_err(|_| malformed("value MAC is not 32 bytes"))?;
        mixer.mix(index_mac, value_mac, operation)?;

        if let Some(mutations) = mutations.as_deref_mut() {
            let Some(index) = parse_index(&action.index) else {
                return Err(malformed("index is not a JSON list of strings"));
            };
            let key = String::from_utf8_lossy(&action.index).into_owned();
            mutations.insert(
                key,
                Mutation {
                    operation,
                    index,
                    value: action.value,
                    api_version: action.version,
                    index_mac,
                    value_mac,
                },
            );
        }
    }

    Ok(mixer.finish())
}

fn mismatch(kind: MacKind, collection: CollectionName, version: u64) -> AppStateError {
    AppStateError::HmacMismatch { kind, collection, version }
}

/// Mutation keys resolved once per key id for the duration of a decode.
struct KeyCache<'a, L> {
    lookup: &'a L,
    collection: CollectionName,
    keys: HashMap<Vec<u8>, MutationKeys>,
}

impl<'a, L: KeyLookup> KeyCache<'a, L> {
    fn new(lookup: &'a L, collection: CollectionName) -> Self {
        Self { lookup, collection, keys: HashMap::new() }
    }

    async fn get(&mut self, raw_key_id: &[u8]) -> Result<&MutationKeys, AppStateError> {
        match self.keys.entry(raw_key_id.to_vec()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let key_id = encode_key_id(raw_key_id);
                let Some(sync_key) = self.lookup.app_state_sync_key(&key_id).await? else {
                    return Err(AppStateError::KeyNotFound { key_id, collection: self.collection });
                };
                Ok(entry.insert(MutationKeys::derive(&sync_key.key_data)))
            }
        }
    }
}
