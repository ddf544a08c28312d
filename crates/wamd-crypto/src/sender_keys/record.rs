//! Bounded history of sender key states for one `(group, sender)` pair

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::state::SenderKeyState;
use crate::{
    error::SenderKeyError,
    limits::{MAX_MESSAGE_KEYS, MAX_STATES},
};

/// All sender key states known for one sender in one group.
///
/// # Invariants
///
/// - At most [`MAX_STATES`] states, newest last; the oldest by insertion is
///   evicted first (use does not refresh position)
/// - At most one state per key id
/// - Each state caches at most [`MAX_MESSAGE_KEYS`] skipped message keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderKeyRecord {
    states: VecDeque<SenderKeyState>,
}

impl SenderKeyRecord {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no state has been created or received yet.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Number of states held.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// State for `key_id`, or the newest state when `key_id` is `None`.
    pub fn sender_key_state(&self, key_id: Option<u32>) -> Option<&SenderKeyState> {
        match key_id {
            None => self.states.back(),
            Some(id) => self.states.iter().find(|state| state.key_id() == id),
        }
    }

    /// Mutable variant of [`Self::sender_key_state`].
    pub fn sender_key_state_mut(&mut self, key_id: Option<u32>) -> Option<&mut SenderKeyState> {
        match key_id {
            None => self.states.back_mut(),
            Some(id) => self.states.iter_mut().find(|state| state.key_id() == id),
        }
    }

    /// Key ids in insertion order, oldest first.
    pub fn key_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.states.iter().map(SenderKeyState::key_id)
    }

    /// Add a state received from a peer's distribution message.
    ///
    /// A redelivered distribution (same key id, same signing key) keeps the
    /// existing state and its ratchet position; it only moves to the newest
    /// slot. Any other state under that key id is dropped. Evicts the oldest
    /// state when over capacity.
    pub fn add_sender_key_state(
        &mut self,
        key_id: u32,
        iteration: u32,
        chain_seed: [u8; 32],
        signing_public: [u8; 32],
    ) {
        let existing = self
            .states
            .iter()
            .position(|state| {
                state.key_id() == key_id && state.signing_public() == &signing_public
            })
            .and_then(|index| self.states.remove(index));

        self.states.retain(|state| state.key_id() != key_id);

        let state = existing.unwrap_or_else(|| {
            SenderKeyState::new(key_id, iteration, chain_seed, signing_public, None)
        });
        self.states.push_back(state);

        while self.states.len() > MAX_STATES {
            self.states.pop_front();
        }
    }

    /// Replace the whole record with our own freshly created state.
    pub fn set_sender_key_state(
        &mut self,
        key_id: u32,
        iteration: u32,
        chain_seed: [u8; 32],
        signing_public: [u8; 32],
        signing_private: [u8; 32],
    ) {
        self.states.clear();
        self.states.push_back(SenderKeyState::new(
            key_id,
            iteration,
            chain_seed,
            signing_public,
            Some(signing_private),
        ));
    }

    /// CBOR encoding for the key store.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SenderKeyError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| SenderKeyError::Malformed { reason: e.to_string() })?;
        Ok(bytes)
    }

    /// Decode a record produced by [`Self::to_bytes`].
    ///
    /// # Errors
    ///
    /// - `Malformed` for undecodable bytes, or a record that breaks the state
    ///   count, key id uniqueness or message key cache bounds
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SenderKeyError> {
        let record: Self = ciborium::from_reader(bytes)
            .map_err(|e| SenderKeyError::Malformed { reason: e.to_string() })?;
        record.validate()?;
        Ok(record)
    }

    fn validate(&self) -> Result<(), SenderKeyError> {
        if self.states.len() > MAX_STATES {
            let reason = format!("{} states, limit {MAX_STATES}", self.states.len());
            return Err(SenderKeyError::Malformed { reason });
        }

        for (index, state) in self.states.iter().enumerate() {
            let key_id = state.key_id();
            if self.states.iter().skip(index + 1).any(|other| other.key_id() == key_id) {
                let reason = format!("duplicate key id {key_id}");
                return Err(SenderKeyError::Malformed { reason });
            }
            if state.message_key_count() > MAX_MESSAGE_KEYS {
                let reason = format!(
                    "key id {key_id} caches {} message keys, limit {MAX_MESSAGE_KEYS}",
                    state.message_key_count()
                );
                return Err(SenderKeyError::Malformed { reason });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_state_is_default() {
        let mut record = SenderKeyRecord::new();
        record.add_sender_key_state(1, 0, [1; 32], [1; 32]);
        record.add_sender_key_state(2, 0, [2; 32], [2; 32]);

        assert_eq!(record.sender_key_state(None).unwrap().key_id(), 2);
        assert_eq!(record.sender_key_state(Some(1)).unwrap().key_id(), 1);
        assert!(record.sender_key_state(Some(3)).is_none());
    }

    #[test]
    fn sixth_state_evicts_oldest() {
        let mut record = SenderKeyRecord::new();
        for id in 1..=6 {
            record.add_sender_key_state(id, 0, [id as u8; 32], [0; 32]);
        }

        assert_eq!(record.len(), MAX_STATES);
        assert_eq!(record.key_ids().collect::<Vec<_>>(), vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn eviction_ignores_use() {
        let mut record = SenderKeyRecord::new();
        for id in 1..=5 {
            record.add_sender_key_state(id, 0, [id as u8; 32], [0; 32]);
        }

        // Using the oldest state does not protect it
        record.sender_key_state_mut(Some(1)).unwrap().message_key_for(0).unwrap();
        record.add_sender_key_state(6, 0, [6; 32], [0; 32]);

        assert!(record.sender_key_state(Some(1)).is_none());
    }

    #[test]
    fn same_key_id_with_new_signing_key_is_replaced() {
        let mut record = SenderKeyRecord::new();
        record.add_sender_key_state(9, 0, [1; 32], [0; 32]);
        record.add_sender_key_state(3, 0, [2; 32], [0; 32]);
        record.add_sender_key_state(9, 4, [3; 32], [1; 32]);

        assert_eq!(record.len(), 2);
        assert_eq!(record.key_ids().collect::<Vec<_>>(), vec![3, 9]);
        let state = record.sender_key_state(Some(9)).unwrap();
        assert_eq!(state.chain_key().iteration(), 4);
        assert_eq!(state.signing_public(), &[1; 32]);
    }

    #[test]
    fn redelivered_distribution_keeps_ratchet_position() {
        let mut record = SenderKeyRecord::new();
        record.add_sender_key_state(9, 0, [1; 32], [7; 32]);
        record.add_sender_key_state(3, 0, [2; 32], [8; 32]);
        record.sender_key_state_mut(Some(9)).unwrap().message_key_for(2).unwrap();

        record.add_sender_key_state(9, 0, [1; 32], [7; 32]);

        // INVARIANT: the chain never moves back to a consumed iteration
        assert_eq!(record.len(), 2);
        assert_eq!(record.key_ids().collect::<Vec<_>>(), vec![3, 9]);
        let state = record.sender_key_state(Some(9)).unwrap();
        assert_eq!(state.chain_key().iteration(), 3);
        assert_eq!(state.message_key_count(), 2);
    }

    #[test]
    fn set_clears_previous_states() {
        let mut record = SenderKeyRecord::new();
        record.add_sender_key_state(1, 0, [1; 32], [1; 32]);
        record.add_sender_key_state(2, 0, [2; 32], [2; 32]);

        record.set_sender_key_state(3, 0, [3; 32], [3; 32], [4; 32]);

        assert_eq!(record.len(), 1);
        let state = record.sender_key_state(None).unwrap();
        assert_eq!(state.key_id(), 3);
        assert_eq!(state.signing_private(), Some(&[4; 32]));
    }

    #[test]
    fn serialization_keeps_skipped_keys() {
        let mut record = SenderKeyRecord::new();
        record.add_sender_key_state(5, 0, [5; 32], [6; 32]);
        record.sender_key_state_mut(None).unwrap().message_key_for(10).unwrap();

        let decoded = SenderKeyRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded, record);
        let state = decoded.sender_key_state(Some(5)).unwrap();
        assert_eq!(state.message_key_count(), 10);
        assert_eq!(state.chain_key().iteration(), 11);
    }

    #[test]
    fn oversized_record_is_malformed() {
        let mut record = SenderKeyRecord::new();
        for id in 1..=5 {
            record.add_sender_key_state(id, 0, [id as u8; 32], [0; 32]);
        }
        record.states.push_back(SenderKeyState::new(6, 0, [6; 32], [0; 32], None));

        let err = SenderKeyRecord::from_bytes(&record.to_bytes().unwrap()).unwrap_err();
        assert_eq!(err, SenderKeyError::Malformed { reason: "6 states, limit 5".into() });
    }

    #[test]
    fn duplicate_key_id_is_malformed() {
        let mut record = SenderKeyRecord::new();
        record.add_sender_key_state(4, 0, [1; 32], [0; 32]);
        record.states.push_back(SenderKeyState::new(4, 9, [2; 32], [1; 32], None));

        let err = SenderKeyRecord::from_bytes(&record.to_bytes().unwrap()).unwrap_err();
        assert_eq!(err, SenderKeyError::Malformed { reason: "duplicate key id 4".into() });
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            SenderKeyRecord::from_bytes(&[0xff, 0x00, 0x13]),
            Err(SenderKeyError::Malformed { .. })
        ));
    }
}
