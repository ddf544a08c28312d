//! What the sync loop needs from the server

use std::future::Future;

use thiserror::Error;
use wamd_core::app_state::{CollectionName, SyncdPatch, SyncdSnapshot};

/// Request for a collection's changes since `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRequest {
    /// Collection to fetch
    pub collection: CollectionName,
    /// Version the client already has
    pub version: u64,
    /// Ask for a full snapshot (first sync or after a reset)
    pub return_snapshot: bool,
}

/// Server answer to a [`SyncRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncResponse {
    /// Full snapshot, if requested and available
    pub snapshot: Option<SyncdSnapshot>,
    /// Patches after the snapshot (or after the requested version), in order
    pub patches: Vec<SyncdPatch>,
    /// More patches remain; fetch again from the new version
    pub has_more_patches: bool,
}

/// Transport failure, opaque to the sync loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Server interface for app-state sync.
pub trait SyncTransport: Send + Sync + 'static {
    /// Fetch changes for one collection.
    fn fetch(
        &self,
        request: SyncRequest,
    ) -> impl Future<Output = Result<SyncResponse, TransportError>> + Send;

    /// Upload a locally encoded patch taking `collection` to `version`.
    fn push(
        &self,
        collection: CollectionName,
        version: u64,
        patch: SyncdPatch,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
