//! Sender Keys: the group messaging ratchet
//!
//! Each member of a group owns one outbound chain. Other members learn it
//! from a distribution message and follow it forward.
//!
//! ```text
//! SenderKeyDistributionMessage (key_id, iteration, chain seed, signing key)
//!        │
//!        ▼ add_sender_key_state
//! SenderKeyRecord ── up to 5 SenderKeyStates
//!        │
//!        ▼ message_key_for(iteration)
//! SenderChainKey ──HMAC(0x01)──► SenderMessageKey ──HKDF──► iv ‖ AES key
//!        │
//!        ▼ HMAC(0x02)
//! next SenderChainKey
//! ```
//!
//! # Security Properties
//!
//! - Forward Secrecy: chain keys only move forward and are zeroized on drop
//! - Out-of-order delivery: keys skipped over are cached, bounded to 2000
//! - Sender Authentication: every message carries an XEdDSA signature by the
//!   sender's Curve25519 key over key id, iteration and ciphertext

pub mod chain_key;
pub mod message;
pub mod message_key;
pub mod record;
pub mod signing;
pub mod state;

pub use chain_key::SenderChainKey;
pub use message::{CURRENT_VERSION, SenderKeyDistributionMessage, SenderKeyMessage};
pub use message_key::SenderMessageKey;
pub use record::SenderKeyRecord;
pub use signing::{SIGNATURE_SIZE, SigningKeyPair, sign, verify};
pub use state::SenderKeyState;
