//! App-state sync keys and the subkeys derived from them

use std::{collections::HashMap, future::Future};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use wamd_crypto::primitives::hkdf_sha256;
use zeroize::Zeroize;

use crate::store::{KeyNamespace, KeyStore, StoreError, Transaction, load_value, store_value};

/// HKDF info label for mutation subkeys
const MUTATION_KEYS_INFO: &[u8] = b"WhatsApp Mutation Keys";

/// Shared account key used to encrypt and authenticate app-state mutations.
///
/// Distributed between the account's devices out of band; ids are base64 on
/// the API and raw bytes on the wire.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStateSyncKey {
    /// Base64 key id
    pub key_id: String,
    /// 32-byte key material
    pub key_data: [u8; 32],
}

impl AppStateSyncKey {
    /// Key with raw id bytes `key_id`.
    pub fn new(key_id: &[u8], key_data: [u8; 32]) -> Self {
        Self { key_id: encode_key_id(key_id), key_data }
    }

    /// Raw key id bytes.
    pub fn key_id_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.key_id)
    }
}

impl std::fmt::Debug for AppStateSyncKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppStateSyncKey").field("key_id", &self.key_id).finish_non_exhaustive()
    }
}

impl Drop for AppStateSyncKey {
    fn drop(&mut self) {
        self.key_data.zeroize();
    }
}

/// Base64 form of a raw key id.
pub fn encode_key_id(raw: &[u8]) -> String {
    BASE64.encode(raw)
}

/// The five subkeys expanded from one [`AppStateSyncKey`].
///
/// ```text
/// HKDF-SHA256(key_data, info = "WhatsApp Mutation Keys", 160 bytes)
///   [0..32)    index key             HMAC-SHA256 over index bytes
///   [32..64)   value encryption key  AES-256-CBC
///   [64..96)   value MAC key         HMAC-SHA512, truncated
///   [96..128)  snapshot MAC key      HMAC-SHA256
///   [128..160) patch MAC key         HMAC-SHA256
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct MutationKeys {
    /// Authenticates the plaintext index
    pub index_key: [u8; 32],
    /// Encrypts `SyncActionData`
    pub value_encryption_key: [u8; 32],
    /// Authenticates the encrypted value
    pub value_mac_key: [u8; 32],
    /// Authenticates LTHash + version + collection
    pub snapshot_mac_key: [u8; 32],
    /// Authenticates a whole patch
    pub patch_mac_key: [u8; 32],
}

impl MutationKeys {
    /// Expand `key_data` into the five subkeys.
    pub fn derive(key_data: &[u8]) -> Self {
        let mut expanded = [0u8; 160];
        let Ok(()) = hkdf_sha256(key_data, MUTATION_KEYS_INFO, &mut expanded) else {
            unreachable!("160 bytes is a valid HKDF-SHA256 output length");
        };

        let mut keys = Self {
            index_key: [0; 32],
            value_encryption_key: [0; 32],
            value_mac_key: [0; 32],
            snapshot_mac_key: [0; 32],
            patch_mac_key: [0; 32],
        };
        keys.index_key.copy_from_slice(&expanded[0..32]);
        keys.value_encryption_key.copy_from_slice(&expanded[32..64]);
        keys.value_mac_key.copy_from_slice(&expanded[64..96]);
        keys.snapshot_mac_key.copy_from_slice(&expanded[96..128]);
        keys.patch_mac_key.copy_from_slice(&expanded[128..160]);
        expanded.zeroize();

        keys
    }
}

impl std::fmt::Debug for MutationKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationKeys").finish_non_exhaustive()
    }
}

impl Drop for MutationKeys {
    fn drop(&mut self) {
        self.index_key.zeroize();
        self.value_encryption_key.zeroize();
        self.value_mac_key.zeroize();
        self.snapshot_mac_key.zeroize();
        self.patch_mac_key.zeroize();
    }
}

/// Resolves base64 key ids to app-state sync keys.
pub trait KeyLookup: Send + Sync {
    /// Key for `key_id`, or `None` if unknown.
    fn app_state_sync_key(
        &self,
        key_id: &str,
    ) -> impl Future<Output = Result<Option<AppStateSyncKey>, StoreError>> + Send;
}

impl<S: KeyStore> KeyLookup for S {
    async fn app_state_sync_key(
        &self,
        key_id: &str,
    ) -> Result<Option<AppStateSyncKey>, StoreError> {
        load_value(self, KeyNamespace::AppStateSyncKey, key_id).await
    }
}

impl<S: KeyStore> KeyLookup for Transaction<S> {
    async fn app_state_sync_key(
        &self,
        key_id: &str,
    ) -> Result<Option<AppStateSyncKey>, StoreError> {
        self.load(KeyNamespace::AppStateSyncKey, key_id).await
    }
}

impl KeyLookup for HashMap<String, AppStateSyncKey> {
    async fn app_state_sync_key(
        &self,
        key_id: &str,
    ) -> Result<Option<AppStateSyncKey>, StoreError> {
        Ok(self.get(key_id).cloned())
    }
}

/// Persist `key` under its id.
pub async fn store_app_state_sync_key<S: KeyStore>(
    store: &S,
    key: &AppStateSyncKey,
) -> Result<(), StoreError> {
    store_value(store, KeyNamespace::AppStateSyncKey, &key.key_id, key).await
}
