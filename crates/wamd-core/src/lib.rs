//! wamd Core
//!
//! Stateful protocol logic on top of [`wamd_crypto`]: group sender-key
//! sessions, the key store they persist through and the app-state patch
//! codec.
//!
//! # Architecture
//!
//! Nothing here performs network I/O. Randomness comes from an
//! [`Environment`](env::Environment) and persistence from a
//! [`KeyStore`](store::KeyStore), both supplied by the caller, so every
//! operation can be replayed deterministically in tests.
//!
//! # Components
//!
//! - [`group`]: Sender key creation, distribution and group encrypt/decrypt
//! - [`app_state`]: LTHash states, MACs and patch/snapshot encode/decode
//! - [`store`]: Async key store, in-memory backend and transactions
//! - [`mutex`]: Per-key async locks serializing read-modify-write sequences
//! - [`env`]: System and seeded randomness

#![forbid(unsafe_code)]

pub mod app_state;
pub mod env;
pub mod group;
pub mod mutex;
pub mod store;

pub use app_state::{AppStateError, CollectionName, LtHashState};
pub use env::{Environment, SeededEnv, SystemEnv};
pub use group::{GroupCipher, GroupError, GroupSessionBuilder, SenderKeyName};
pub use store::{KeyStore, MemoryKeyStore, StoreError, TransactionalStore};
