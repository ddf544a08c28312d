//! One ratchet line: chain key, signing key and skipped message keys

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::{chain_key::SenderChainKey, message_key::SenderMessageKey};
use crate::{
    error::SenderKeyError,
    limits::{MAX_FUTURE_MESSAGES, MAX_MESSAGE_KEYS},
};

/// State of one sender key (one `key_id`) as seen by a sender or receiver.
///
/// # Invariants
///
/// - The chain key only moves forward
/// - `message_keys` holds at most [`MAX_MESSAGE_KEYS`] entries, oldest first,
///   all with iterations below the chain key's iteration
/// - `signing_private` is present only on the sender's own state
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderKeyState {
    key_id: u32,
    chain_key: SenderChainKey,
    signing_public: [u8; 32],
    signing_private: Option<[u8; 32]>,
    message_keys: VecDeque<SenderMessageKey>,
}

impl SenderKeyState {
    /// Fresh state with an empty skipped-key cache.
    pub fn new(
        key_id: u32,
        iteration: u32,
        chain_seed: [u8; 32],
        signing_public: [u8; 32],
        signing_private: Option<[u8; 32]>,
    ) -> Self {
        Self {
            key_id,
            chain_key: SenderChainKey::new(iteration, chain_seed),
            signing_public,
            signing_private,
            message_keys: VecDeque::new(),
        }
    }

    /// Sender key id.
    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    /// Current chain key (next unused iteration).
    pub fn chain_key(&self) -> &SenderChainKey {
        &self.chain_key
    }

    /// Replace the chain key.
    pub fn set_chain_key(&mut self, chain_key: SenderChainKey) {
        self.chain_key = chain_key;
    }

    /// Curve25519 public key of the sender.
    pub fn signing_public(&self) -> &[u8; 32] {
        &self.signing_public
    }

    /// Curve25519 signing secret; `None` for peer states.
    pub fn signing_private(&self) -> Option<&[u8; 32]> {
        self.signing_private.as_ref()
    }

    /// Number of cached skipped message keys.
    pub fn message_key_count(&self) -> usize {
        self.message_keys.len()
    }

    /// Whether a skipped key for `iteration` is cached.
    pub fn has_message_key(&self, iteration: u32) -> bool {
        self.message_keys.iter().any(|key| key.iteration() == iteration)
    }

    /// Cache a skipped message key, evicting the oldest over capacity.
    pub fn add_message_key(&mut self, key: SenderMessageKey) {
        self.message_keys.push_back(key);
        while self.message_keys.len() > MAX_MESSAGE_KEYS {
            self.message_keys.pop_front();
        }
    }

    /// Remove and return the cached key for `iteration`.
    pub fn remove_message_key(&mut self, iteration: u32) -> Option<SenderMessageKey> {
        let position = self.message_keys.iter().position(|key| key.iteration() == iteration)?;
        self.message_keys.remove(position)
    }

    /// Resolve the message key for `iteration`, advancing the ratchet.
    ///
    /// - Behind the chain: the cached key is consumed
    /// - Ahead of the chain: every key in between is cached, and the chain
    ///   moves to `iteration + 1`
    ///
    /// The state is unchanged when an error is returned.
    ///
    /// # Errors
    ///
    /// - `OldCounter` if `iteration` is behind the chain and not cached
    /// - `FutureMessage` if `iteration` is more than
    ///   [`MAX_FUTURE_MESSAGES`] ahead
    /// - `IterationOverflow` if the chain would pass `u32::MAX`
    pub fn message_key_for(&mut self, iteration: u32) -> Result<SenderMessageKey, SenderKeyError> {
        let current = self.chain_key.iteration();

        if iteration < current {
            return self
                .remove_message_key(iteration)
                .ok_or(SenderKeyError::OldCounter { current, requested: iteration });
        }

        if iteration - current > MAX_FUTURE_MESSAGES {
            return Err(SenderKeyError::FutureMessage { current, requested: iteration });
        }

        let mut chain = self.chain_key.clone();
        let mut skipped = Vec::with_capacity((iteration - current) as usize);
        while chain.iteration() < iteration {
            skipped.push(chain.message_key());
            chain = chain.next()?;
        }

        let message_key = chain.message_key();
        let next = chain.next()?;

        for key in skipped {
            self.add_message_key(key);
        }
        self.chain_key = next;

        Ok(message_key)
    }
}

impl std::fmt::Debug for SenderKeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderKeyState")
            .field("key_id", &self.key_id)
            .field("chain_key", &self.chain_key)
            .field("has_private", &self.signing_private.is_some())
            .field("message_keys", &self.message_keys.len())
            .finish()
    }
}

impl Drop for SenderKeyState {
    fn drop(&mut self) {
        if let Some(private) = self.signing_private.as_mut() {
            private.zeroize();
        }
    }
}
