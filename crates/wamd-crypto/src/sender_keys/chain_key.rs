//! Sender chain key: the one-way KDF step of the group ratchet
//!
//! # Security Properties
//!
//! - Forward Secrecy: a chain key cannot be run backwards to earlier keys
//! - Determinism: same seed and iteration always produce the same sequence
//! - Immutability: advancing returns a new value; the owning state replaces
//!   its slot

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::message_key::SenderMessageKey;
use crate::{error::SenderKeyError, primitives::hmac_sha256};

/// HMAC input for deriving a message key seed
const MESSAGE_KEY_SEED: &[u8] = &[0x01];

/// HMAC input for deriving the next chain key
const CHAIN_KEY_SEED: &[u8] = &[0x02];

/// Immutable chain key at a given iteration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderChainKey {
    iteration: u32,
    seed: [u8; 32],
}

impl SenderChainKey {
    /// Chain key at `iteration` with the given 32-byte seed.
    pub fn new(iteration: u32, seed: [u8; 32]) -> Self {
        Self { iteration, seed }
    }

    /// Iteration this chain key sits at.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Raw chain seed, as carried in distribution messages.
    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    /// Message key for this iteration.
    ///
    /// Does not advance the chain.
    pub fn message_key(&self) -> SenderMessageKey {
        SenderMessageKey::new(self.iteration, hmac_sha256(&self.seed, &[MESSAGE_KEY_SEED]))
    }

    /// Chain key for the next iteration.
    ///
    /// # Errors
    ///
    /// - `IterationOverflow` if the chain is already at `u32::MAX`
    pub fn next(&self) -> Result<Self, SenderKeyError> {
        let iteration = self
            .iteration
            .checked_add(1)
            .ok_or(SenderKeyError::IterationOverflow { current: self.iteration })?;

        Ok(Self { iteration, seed: hmac_sha256(&self.seed, &[CHAIN_KEY_SEED]) })
    }
}

impl std::fmt::Debug for SenderChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderChainKey").field("iteration", &self.iteration).finish_non_exhaustive()
    }
}

impl Drop for SenderChainKey {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}
