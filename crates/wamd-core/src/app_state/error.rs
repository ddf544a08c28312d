use thiserror::Error;
use wamd_crypto::CryptoError;

use super::CollectionName;
use crate::store::StoreError;

/// Which MAC failed to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacKind {
    /// HMAC over a mutation's decrypted index
    Index,
    /// HMAC over a mutation's encrypted value
    Value,
    /// HMAC binding snapshot MAC, value MACs, version and collection
    Patch,
    /// HMAC binding the LTHash, version and collection
    Snapshot,
}

impl std::fmt::Display for MacKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Index => "index",
            Self::Value => "value",
            Self::Patch => "patch",
            Self::Snapshot => "snapshot",
        })
    }
}

/// Errors from encoding or applying app-state patches and snapshots
///
/// None of these are retried at this layer. The sync orchestrator decides
/// whether to reset the collection and refetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppStateError {
    /// No app-state sync key with this id is known locally
    ///
    /// Often transient: the key may still arrive from another device.
    #[error("app-state key {key_id} not found for {collection}")]
    KeyNotFound {
        /// Base64 key id
        key_id: String,
        /// Collection being processed
        collection: CollectionName,
    },

    /// An integrity check failed
    #[error("{kind} MAC mismatch in {collection} at version {version}")]
    HmacMismatch {
        /// Which MAC
        kind: MacKind,
        /// Collection being processed
        collection: CollectionName,
        /// Version of the patch or snapshot
        version: u64,
    },

    /// A REMOVE referenced an index with no live value
    #[error("remove without previous value in {collection} (index mac {index_mac})")]
    MissingPreviousValue {
        /// Collection being processed
        collection: CollectionName,
        /// Base64 index MAC
        index_mac: String,
    },

    /// Structurally invalid payload
    #[error("malformed app-state data in {collection}: {reason}")]
    Malformed {
        /// Collection being processed
        collection: CollectionName,
        /// What was wrong
        reason: String,
    },

    /// Value decryption or encryption failed
    #[error("crypto failure in {collection}: {source}")]
    Crypto {
        /// Collection being processed
        collection: CollectionName,
        /// Primitive error
        #[source]
        source: CryptoError,
    },

    /// Key store failure while looking up keys
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from mapping chat modifications to and from sync actions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// A message key has no id or no chat
    #[error("message key is missing its id or chat")]
    IncompleteKey,

    /// A group message from someone else must name its sender
    #[error("group message {id} not from us has no participant")]
    MissingParticipant {
        /// Message id
        id: String,
    },

    /// A message in a range has no timestamp
    #[error("message {id} has no timestamp")]
    MissingTimestamp {
        /// Message id
        id: String,
    },

    /// The sync action value could not be decoded
    #[error("invalid sync action value: {reason}")]
    InvalidValue {
        /// Decoder error
        reason: String,
    },
}

impl AppStateError {
    /// Returns true if the failure is a missing key rather than bad data.
    pub fn is_key_missing(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }

    /// Returns true if the local state can no longer be trusted and the
    /// collection must be rebuilt from a snapshot.
    pub fn requires_resync(&self) -> bool {
        match self {
            Self::HmacMismatch { .. }
            | Self::MissingPreviousValue { .. }
            | Self::Malformed { .. }
            | Self::Crypto { .. } => true,
            Self::KeyNotFound { .. } | Self::Store(_) => false,
        }
    }
}
