use tracing::{debug, info};
use wamd_crypto::{
    SenderKeyDistributionMessage, SenderKeyRecord, SigningKeyPair, limits::MAX_SENDER_KEY_ID,
};
use zeroize::Zeroizing;

use super::{GroupError, SenderKeyName, load_sender_key, store_sender_key};
use crate::{env::Environment, store::KeyStore};

/// Creates and ingests sender keys.
#[derive(Debug, Clone)]
pub struct GroupSessionBuilder<S, E> {
    store: S,
    env: E,
}

impl<S: KeyStore, E: Environment> GroupSessionBuilder<S, E> {
    /// Builder over `store`, drawing key material from `env`.
    pub fn new(store: S, env: E) -> Self {
        Self { store, env }
    }

    /// Make sure we own a sender key for `name` and describe it.
    ///
    /// The first call generates a key id, chain seed and signing key pair and
    /// persists them. Every call returns a distribution message for the
    /// chain's current iteration, so late joiners cannot decrypt messages
    /// sent before they received it.
    pub async fn create(
        &self,
        name: &SenderKeyName,
    ) -> Result<SenderKeyDistributionMessage, GroupError> {
        let mut record = load_sender_key(&self.store, name).await?.unwrap_or_default();

        if record.is_empty() {
            let key_id = self.env.random_u32() % MAX_SENDER_KEY_ID;
            let chain_seed = Zeroizing::new(self.env.random_array::<32>());
            let signing = SigningKeyPair::from_seed(self.env.random_array());

            record.set_sender_key_state(key_id, 0, *chain_seed, signing.public, signing.private);
            store_sender_key(&self.store, name, &record).await?;
            info!(%name, key_id, "created sender key");
        }

        distribution_for(&record, name)
    }

    /// Start following a peer's chain described by `distribution`.
    ///
    /// The distribution's signing key is trusted as delivered; it arrives
    /// over the pairwise encrypted channel.
    pub async fn process(
        &self,
        name: &SenderKeyName,
        distribution: &SenderKeyDistributionMessage,
    ) -> Result<(), GroupError> {
        let mut record = load_sender_key(&self.store, name).await?.unwrap_or_default();

        record.add_sender_key_state(
            distribution.key_id(),
            distribution.iteration(),
            *distribution.chain_key(),
            *distribution.signing_key(),
        );
        store_sender_key(&self.store, name, &record).await?;

        debug!(
            %name,
            key_id = distribution.key_id(),
            iteration = distribution.iteration(),
            states = record.len(),
            "processed sender key distribution"
        );
        Ok(())
    }
}

fn distribution_for(
    record: &SenderKeyRecord,
    name: &SenderKeyName,
) -> Result<SenderKeyDistributionMessage, GroupError> {
    let Some(state) = record.sender_key_state(None) else {
        return Err(GroupError::NoSession { name: name.to_string(), key_id: None });
    };

    Ok(SenderKeyDistributionMessage::new(
        state.key_id(),
        state.chain_key().iteration(),
        *state.chain_key().seed(),
        *state.signing_public(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{env::SeededEnv, group::ProtocolAddress, store::MemoryKeyStore};

    fn name() -> SenderKeyName {
        SenderKeyName::new("group@g.us", ProtocolAddress::new("alice", 1))
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let builder = GroupSessionBuilder::new(MemoryKeyStore::new(), SeededEnv::new(1));

        let first = builder.create(&name()).await.unwrap();
        let second = builder.create(&name()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.iteration(), 0);
        assert!(first.key_id() < MAX_SENDER_KEY_ID);
    }

    #[tokio::test]
    async fn created_state_owns_private_key() {
        let store = MemoryKeyStore::new();
        let builder = GroupSessionBuilder::new(store.clone(), SeededEnv::new(2));
        builder.create(&name()).await.unwrap();

        let record = load_sender_key(&store, &name()).await.unwrap().unwrap();
        let state = record.sender_key_state(None).unwrap();
        let private = state.signing_private().unwrap();
        assert_eq!(&SigningKeyPair::from_seed(*private).public, state.signing_public());
    }

    #[tokio::test]
    async fn process_adds_peer_state() {
        let store = MemoryKeyStore::new();
        let builder = GroupSessionBuilder::new(store.clone(), SeededEnv::new(3));
        let distribution = SenderKeyDistributionMessage::new(42, 7, [1; 32], [2; 32]);

        builder.process(&name(), &distribution).await.unwrap();

        let record = load_sender_key(&store, &name()).await.unwrap().unwrap();
        let state = record.sender_key_state(Some(42)).unwrap();
        assert_eq!(state.chain_key().iteration(), 7);
        assert!(state.signing_private().is_none());
    }
}
