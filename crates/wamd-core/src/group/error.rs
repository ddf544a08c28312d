use thiserror::Error;
use wamd_crypto::SenderKeyError;

use crate::store::StoreError;

/// Errors from group session operations
///
/// Every variant names the `(group, sender)` pair it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    /// Nothing was ever stored for this sender
    #[error("no sender key record for {name}")]
    NoRecord {
        /// `SenderKeyName` in display form
        name: String,
    },

    /// The record exists but has no usable state
    ///
    /// For encryption: no state or no private signing key. For decryption:
    /// no state with the message's key id.
    #[error("no sender key session for {name} (key id {key_id:?})")]
    NoSession {
        /// `SenderKeyName` in display form
        name: String,
        /// Key id that was looked up, if any
        key_id: Option<u32>,
    },

    /// Ratchet, signature or decryption failure
    #[error("sender key failure for {name} at iteration {iteration:?}: {source}")]
    SenderKey {
        /// `SenderKeyName` in display form
        name: String,
        /// Message iteration, when the message got far enough to carry one
        iteration: Option<u32>,
        /// Underlying ratchet error
        #[source]
        source: SenderKeyError,
    },

    /// Key store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GroupError {
    /// Returns true if the message can never be decrypted.
    ///
    /// Missing records and sessions may resolve once the sender's
    /// distribution message arrives.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::SenderKey { source, .. } => source.is_fatal(),
            Self::NoRecord { .. } | Self::NoSession { .. } | Self::Store(_) => false,
        }
    }
}
