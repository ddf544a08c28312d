//! App-state sync
//!
//! Account settings (mutes, pins, archives, contacts, ...) are replicated
//! between a user's devices as encrypted mutations grouped into
//! collections. Each collection carries an [`LtHashState`]: a version, an
//! LTHash over every live value MAC and the index → value MAC map needed
//! to undo overwrites and removals.
//!
//! ```text
//! PatchCreate ──encode_patch──▶ SyncdPatch ──push──▶ server
//!                                                      │
//! Decoded { state, mutations } ◀──decode_patches── fetch
//! ```
//!
//! Every patch is authenticated three ways: per-mutation value and index
//! MACs, a patch MAC over all value MACs and a snapshot MAC over the
//! resulting LTHash. Decoding never mutates its input state; callers persist
//! the returned state only once the whole batch verified.
//!
//! [`ChatModification`] turns a chat change into a [`PatchCreate`];
//! [`SyncAction::from_mutation`] reads a decoded mutation back.

mod chat;
mod codec;
mod collection;
mod error;
mod keys;
mod mac;
mod mixer;
mod state;
mod wire;

pub use chat::{ChatAction, ChatModification, MessageKey, MessageRange, RangeMessage, SyncAction};
pub use codec::{
    Decoded, EncodedPatch, MacVerification, Mutation, MutationMap, PatchCreate, decode_patch,
    decode_patches, decode_snapshot, encode_patch,
};
pub use collection::{CollectionName, UnknownCollection};
pub use error::{AppStateError, ChatError, MacKind};
pub use keys::{AppStateSyncKey, KeyLookup, MutationKeys, encode_key_id, store_app_state_sync_key};
pub use mac::{
    canonical_index, index_mac, macs_equal, parse_index, patch_mac, snapshot_mac, value_mac,
};
pub use mixer::LtHashMixer;
pub use state::{LtHashState, load_lt_hash_state, store_lt_hash_state};
pub use wire::{
    SyncActionData, SyncdMutation, SyncdOperation, SyncdPatch, SyncdRecord, SyncdSnapshot,
};
