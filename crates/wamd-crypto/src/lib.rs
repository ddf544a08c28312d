//! wamd Cryptographic Primitives
//!
//! Pure, synchronous building blocks for the WhatsApp multi-device group
//! ratchet and app-state sync. No I/O and no randomness: callers supply
//! random bytes so every operation is reproducible in tests.
//!
//! # Key Lifecycle
//!
//! Group messages:
//!
//! ```text
//! random chain seed + Curve25519 key pair
//!        │
//!        ▼ distribution message
//! SenderKeyState (per group, per sender, per key id)
//!        │
//!        ▼ symmetric ratchet
//! SenderMessageKey → AES-256-CBC → signed SenderKeyMessage
//! ```
//!
//! App state:
//!
//! ```text
//! app-state sync key data
//!        │
//!        ▼ HKDF "WhatsApp Mutation Keys"
//! index key, value encryption key, value/snapshot/patch MAC keys
//!        │
//!        ▼
//! value MACs folded into an LTHash, bound by snapshot and patch MACs
//! ```
//!
//! # Security
//!
//! Forward Secrecy:
//! - Chain keys are one-way; skipped message keys are cached, not re-derived
//! - Key material is zeroized on drop
//!
//! Authenticity:
//! - Sender key messages carry an XEdDSA signature over the whole message
//! - App-state mutations are bound by per-value HMAC-SHA512 and chained
//!   HMAC-SHA256 snapshot and patch MACs

#![forbid(unsafe_code)]

pub mod error;
pub mod limits;
pub mod lthash;
pub mod primitives;
pub mod sender_keys;

pub use error::{CryptoError, SenderKeyError};
pub use lthash::EMPTY_LT_HASH;
pub use sender_keys::{
    SenderChainKey, SenderKeyDistributionMessage, SenderKeyMessage, SenderKeyRecord,
    SenderKeyState, SenderMessageKey, SigningKeyPair,
};
