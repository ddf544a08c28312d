//! Serialized access to group sessions

use tracing::trace;
use wamd_core::{
    Environment, GroupCipher, GroupError, GroupSessionBuilder, KeyStore, SenderKeyName,
    mutex::{KeyedGuard, KeyedMutex},
};
use wamd_crypto::SenderKeyDistributionMessage;

/// Group session operations, one at a time per sender key name.
///
/// Every operation loads a sender key record, advances it and writes it
/// back. Calls for the same `(group, sender)` wait for each other; calls
/// for different names run concurrently.
#[derive(Debug, Clone)]
pub struct GroupSessions<S, E> {
    store: S,
    env: E,
    locks: KeyedMutex<SenderKeyName>,
}

impl<S: KeyStore, E: Environment> GroupSessions<S, E> {
    /// Sessions persisted in `store`, with key material drawn from `env`.
    pub fn new(store: S, env: E) -> Self {
        Self { store, env, locks: KeyedMutex::new() }
    }

    /// See [`GroupSessionBuilder::create`].
    pub async fn create(
        &self,
        name: &SenderKeyName,
    ) -> Result<SenderKeyDistributionMessage, GroupError> {
        let _guard = self.lock(name).await;
        GroupSessionBuilder::new(self.store.clone(), self.env.clone()).create(name).await
    }

    /// See [`GroupSessionBuilder::process`].
    pub async fn process(
        &self,
        name: &SenderKeyName,
        distribution: &SenderKeyDistributionMessage,
    ) -> Result<(), GroupError> {
        let _guard = self.lock(name).await;
        let builder = GroupSessionBuilder::new(self.store.clone(), self.env.clone());
        builder.process(name, distribution).await
    }

    /// See [`GroupCipher::encrypt`].
    pub async fn encrypt(
        &self,
        name: &SenderKeyName,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, GroupError> {
        let _guard = self.lock(name).await;
        self.cipher(name).encrypt(plaintext).await
    }

    /// See [`GroupCipher::decrypt`].
    pub async fn decrypt(
        &self,
        name: &SenderKeyName,
        message: &[u8],
    ) -> Result<Vec<u8>, GroupError> {
        let _guard = self.lock(name).await;
        self.cipher(name).decrypt(message).await
    }

    fn cipher(&self, name: &SenderKeyName) -> GroupCipher<S, E> {
        GroupCipher::new(self.store.clone(), self.env.clone(), name.clone())
    }

    async fn lock(&self, name: &SenderKeyName) -> KeyedGuard<SenderKeyName> {
        let guard = self.locks.lock(name.clone()).await;
        trace!(%name, "sender key locked");
        guard
    }
}
