use tracing::{debug, warn};
use wamd_crypto::{
    SenderKeyError, SenderKeyMessage,
    primitives::{aes_cbc_decrypt, aes_cbc_encrypt},
};
use zeroize::Zeroizing;

use super::{GroupError, SenderKeyName, load_sender_key, store_sender_key};
use crate::{env::Environment, store::KeyStore};

/// Encrypts and decrypts group messages for one sender key name.
#[derive(Debug, Clone)]
pub struct GroupCipher<S, E> {
    store: S,
    env: E,
    name: SenderKeyName,
}

impl<S: KeyStore, E: Environment> GroupCipher<S, E> {
    /// Cipher for `name`, backed by `store`. Signature nonces come from `env`.
    pub fn new(store: S, env: E, name: SenderKeyName) -> Self {
        Self { store, env, name }
    }

    /// Sender key name this cipher works on.
    pub fn name(&self) -> &SenderKeyName {
        &self.name
    }

    /// Encrypt `plaintext` with our own sender key.
    ///
    /// Uses the key at the chain's current iteration, so consecutive calls
    /// produce iterations 0, 1, 2, ...
    ///
    /// # Errors
    ///
    /// - `NoRecord` if [`GroupSessionBuilder::create`] never ran for this name
    /// - `NoSession` if the newest state has no private signing key
    ///
    /// [`GroupSessionBuilder::create`]: super::GroupSessionBuilder::create
    pub async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, GroupError> {
        let Some(mut record) = load_sender_key(&self.store, &self.name).await? else {
            return Err(GroupError::NoRecord { name: self.name.to_string() });
        };

        let Some(state) = record.sender_key_state_mut(None) else {
            return Err(self.no_session(None));
        };
        let key_id = state.key_id();
        let Some(signing_private) = state.signing_private().map(|key| Zeroizing::new(*key)) else {
            return Err(self.no_session(Some(key_id)));
        };

        let iteration = state.chain_key().iteration();
        let message_key =
            state.message_key_for(iteration).map_err(|e| self.failure(Some(iteration), e))?;

        let ciphertext = aes_cbc_encrypt(message_key.cipher_key(), message_key.iv(), plaintext)
            .map_err(|e| self.failure(Some(iteration), e.into()))?;
        let nonce = Zeroizing::new(self.env.random_array::<64>());
        let message = SenderKeyMessage::new(
            key_id,
            message_key.iteration(),
            ciphertext,
            &signing_private,
            &nonce,
        );

        store_sender_key(&self.store, &self.name, &record).await?;

        debug!(name = %self.name, key_id, iteration, "encrypted group message");
        Ok(message.serialized().to_vec())
    }

    /// Verify and decrypt a peer's group message.
    ///
    /// The record is persisted only when the whole message checks out; a
    /// rejected message leaves the stored ratchet untouched.
    pub async fn decrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, GroupError> {
        let message = SenderKeyMessage::deserialize(bytes).map_err(|e| self.failure(None, e))?;
        let iteration = message.iteration();

        let Some(mut record) = load_sender_key(&self.store, &self.name).await? else {
            return Err(GroupError::NoRecord { name: self.name.to_string() });
        };
        let Some(state) = record.sender_key_state_mut(Some(message.key_id())) else {
            return Err(self.no_session(Some(message.key_id())));
        };

        if let Err(e) = message.verify_signature(state.signing_public()) {
            warn!(
                name = %self.name,
                key_id = message.key_id(),
                iteration,
                "group message signature rejected"
            );
            return Err(self.failure(Some(iteration), e));
        }

        let message_key =
            state.message_key_for(iteration).map_err(|e| self.failure(Some(iteration), e))?;
        let plaintext =
            aes_cbc_decrypt(message_key.cipher_key(), message_key.iv(), message.ciphertext())
            .map_err(|e| self.failure(Some(iteration), e.into()))?;

        store_sender_key(&self.store, &self.name, &record).await?;

        debug!(name = %self.name, key_id = message.key_id(), iteration, "decrypted group message");
        Ok(plaintext)
    }

    fn no_session(&self, key_id: Option<u32>) -> GroupError {
        GroupError::NoSession { name: self.name.to_string(), key_id }
    }

    fn failure(&self, iteration: Option<u32>, source: SenderKeyError) -> GroupError {
        GroupError::SenderKey { name: self.name.to_string(), iteration, source }
    }
}
