use thiserror::Error;
use wamd_core::{AppStateError, CollectionName, StoreError};

use crate::transport::TransportError;

/// App-state sync errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Encoding or applying a collection failed
    #[error("app-state sync failed for {collection}: {source}")]
    AppState {
        /// Collection being processed
        collection: CollectionName,
        /// Underlying codec error
        #[source]
        source: AppStateError,
    },

    /// Fetch or push failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Reading or committing state failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The server reported more patches without advancing the collection
    #[error("{collection} stalled at version {version} with more patches pending")]
    Stalled {
        /// Collection being fetched
        collection: CollectionName,
        /// Version the collection is stuck at
        version: u64,
    },

    /// No own app-state key is configured, so patches cannot be encoded
    #[error("no app-state sync key configured")]
    NoAppStateKey,
}

impl SyncError {
    /// Returns true if retrying the same call cannot succeed.
    ///
    /// A missing key may still arrive from another device; transport
    /// failures are usually transient.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::AppState { source, .. } => !source.is_key_missing(),
            Self::Transport(_) | Self::Stalled { .. } => false,
            Self::Store(_) | Self::NoAppStateKey => true,
        }
    }

    pub(crate) fn app_state(collection: CollectionName) -> impl FnOnce(AppStateError) -> Self {
        move |source| Self::AppState { collection, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_not_fatal() {
        let collection = CollectionName::Regular;
        let missing = AppStateError::KeyNotFound { key_id: "AAE=".into(), collection };
        let err = SyncError::app_state(collection)(missing);
        assert!(!err.is_fatal());
        assert!(!SyncError::Transport(TransportError("timeout".into())).is_fatal());
        assert!(SyncError::NoAppStateKey.is_fatal());
        assert!(!SyncError::Stalled { collection, version: 3 }.is_fatal());
    }
}
