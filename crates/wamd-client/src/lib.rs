//! Client
//!
//! Orchestration on top of [`wamd_core`]: a group session facade that
//! serializes work per sender key, and the app-state sync loop that fetches,
//! verifies, applies and pushes collection patches.
//!
//! # Components
//!
//! - [`GroupSessions`]: `create`/`process`/`encrypt`/`decrypt` behind a
//!   per-`(group, sender)` lock
//! - [`AppStateSync`]: `resync`, `app_patch` and `chat_modify` behind an
//!   account-wide lock
//! - [`SyncTransport`]: what the sync loop needs from the network
//! - [`SyncConfig`]: retry bound and MAC verification switches

#![forbid(unsafe_code)]

mod config;
mod error;
mod group;
mod sync;
mod transport;

pub use config::{DEFAULT_MAX_SYNC_ATTEMPTS, SyncConfig};
pub use error::SyncError;
pub use group::GroupSessions;
pub use sync::{AppPatchOutcome, AppStateSync};
pub use transport::{SyncRequest, SyncResponse, SyncTransport, TransportError};
