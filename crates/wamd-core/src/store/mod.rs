//! Key storage abstraction
//!
//! Everything the protocol persists (sender key records, app-state sync keys,
//! per-collection LTHash states) goes through [`KeyStore`]: an async
//! namespace/id → bytes map. Values are CBOR-encoded by the typed helpers in
//! this module, so backends never see protocol types.
//!
//! Read-modify-write sequences run inside a [`Transaction`], which buffers
//! writes and commits them in one [`KeyStore::set_many`] call.

mod memory;
mod transaction;

use std::future::Future;

pub use memory::MemoryKeyStore;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
pub use transaction::{Transaction, TransactionalStore};

/// Logical table a value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyNamespace {
    /// Sender key records, keyed by `SenderKeyName`
    SenderKey,
    /// App-state sync keys, keyed by base64 key id
    AppStateSyncKey,
    /// LTHash state per app-state collection
    AppStateVersion,
}

impl KeyNamespace {
    /// Stable name used by persistent backends.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SenderKey => "sender-key",
            Self::AppStateSyncKey => "app-state-sync-key",
            Self::AppStateVersion => "app-state-sync-version",
        }
    }
}

impl std::fmt::Display for KeyNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pending write. `None` deletes the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreWrite {
    /// Target namespace
    pub namespace: KeyNamespace,
    /// Entry id within the namespace
    pub id: String,
    /// New value, or `None` to delete
    pub value: Option<Vec<u8>>,
}

/// Storage errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend failed (I/O, lock poisoned, remote unavailable)
    #[error("store backend error: {0}")]
    Backend(String),

    /// Stored bytes did not decode, or a value did not encode
    #[error("codec error for {namespace}/{id}: {reason}")]
    Codec {
        /// Namespace of the entry
        namespace: KeyNamespace,
        /// Entry id
        id: String,
        /// Decoder error
        reason: String,
    },
}

/// Async key/value store for protocol state.
///
/// Implementations share state between clones (typically via `Arc`), so a
/// store can be handed to several components.
pub trait KeyStore: Clone + Send + Sync + 'static {
    /// Load an entry. `None` if absent.
    fn get(
        &self,
        namespace: KeyNamespace,
        id: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    /// Write or delete (`None`) one entry.
    fn set(
        &self,
        namespace: KeyNamespace,
        id: &str,
        value: Option<Vec<u8>>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Apply a batch of writes.
    ///
    /// The default applies them one by one. Backends that can should
    /// override this to make the batch atomic.
    fn set_many(
        &self,
        writes: Vec<StoreWrite>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move {
            for write in writes {
                self.set(write.namespace, &write.id, write.value).await?;
            }
            Ok(())
        }
    }
}

/// Load and CBOR-decode an entry.
pub async fn load_value<S, T>(
    store: &S,
    namespace: KeyNamespace,
    id: &str,
) -> Result<Option<T>, StoreError>
where
    S: KeyStore,
    T: DeserializeOwned,
{
    let Some(bytes) = store.get(namespace, id).await? else {
        return Ok(None);
    };

    ciborium::from_reader(bytes.as_slice())
        .map(Some)
        .map_err(|e| StoreError::Codec { namespace, id: id.to_string(), reason: e.to_string() })
}

/// CBOR-encode a value for [`KeyStore::set`].
pub fn encode_value<T: Serialize>(
    namespace: KeyNamespace,
    id: &str,
    value: &T,
) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| StoreError::Codec { namespace, id: id.to_string(), reason: e.to_string() })?;
    Ok(bytes)
}

/// CBOR-encode and store a value.
pub async fn store_value<S, T>(
    store: &S,
    namespace: KeyNamespace,
    id: &str,
    value: &T,
) -> Result<(), StoreError>
where
    S: KeyStore,
    T: Serialize + Sync,
{
    let bytes = encode_value(namespace, id, value)?;
    store.set(namespace, id, Some(bytes)).await
}
