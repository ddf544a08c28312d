//! Per-message key derived from a chain key
//!
//! The 32-byte chain derivative is expanded with HKDF-SHA256 (no salt,
//! info `"WhisperGroup"`) into 48 bytes: a 16-byte CBC IV followed by a
//! 32-byte AES-256 key.

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::primitives::{AES_BLOCK_SIZE, AES_KEY_SIZE, hkdf_sha256};

/// HKDF info label for sender message keys
const WHISPER_GROUP_INFO: &[u8] = b"WhisperGroup";

/// Key material for exactly one group message.
///
/// Only `(iteration, seed)` is persisted; the IV and cipher key are
/// re-derived on load.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredMessageKey", into = "StoredMessageKey")]
pub struct SenderMessageKey {
    iteration: u32,
    seed: [u8; 32],
    iv: [u8; AES_BLOCK_SIZE],
    cipher_key: [u8; AES_KEY_SIZE],
}

#[derive(Serialize, Deserialize)]
struct StoredMessageKey {
    iteration: u32,
    seed: [u8; 32],
}

impl SenderMessageKey {
    /// Expand a chain derivative into IV and cipher key.
    pub fn new(iteration: u32, seed: [u8; 32]) -> Self {
        let mut derivative = [0u8; AES_BLOCK_SIZE + AES_KEY_SIZE];
        let Ok(()) = hkdf_sha256(&seed, WHISPER_GROUP_INFO, &mut derivative) else {
            unreachable!("48 bytes is a valid HKDF-SHA256 output length");
        };

        let mut iv = [0u8; AES_BLOCK_SIZE];
        let mut cipher_key = [0u8; AES_KEY_SIZE];
        iv.copy_from_slice(&derivative[..AES_BLOCK_SIZE]);
        cipher_key.copy_from_slice(&derivative[AES_BLOCK_SIZE..]);
        derivative.zeroize();

        Self { iteration, seed, iv, cipher_key }
    }

    /// Chain iteration this key belongs to.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// 16-byte CBC initialization vector.
    pub fn iv(&self) -> &[u8; AES_BLOCK_SIZE] {
        &self.iv
    }

    /// 32-byte AES-256 key.
    pub fn cipher_key(&self) -> &[u8; AES_KEY_SIZE] {
        &self.cipher_key
    }

    /// Chain derivative the key was expanded from.
    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }
}

impl From<StoredMessageKey> for SenderMessageKey {
    fn from(stored: StoredMessageKey) -> Self {
        Self::new(stored.iteration, stored.seed)
    }
}

impl From<SenderMessageKey> for StoredMessageKey {
    fn from(key: SenderMessageKey) -> Self {
        Self { iteration: key.iteration, seed: key.seed }
    }
}

impl std::fmt::Debug for SenderMessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderMessageKey")
            .field("iteration", &self.iteration)
            .finish_non_exhaustive()
    }
}

impl Drop for SenderMessageKey {
    fn drop(&mut self) {
        self.seed.zeroize();
        self.iv.zeroize();
        self.cipher_key.zeroize();
    }
}
