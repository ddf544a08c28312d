//! App-state sync orchestration
//!
//! ```text
//! resync([collections])
//!   lock account, begin transaction
//!   loop over pending collections:
//!     load state ─▶ fetch(version, return_snapshot = version == 0)
//!       ─▶ decode snapshot ─▶ decode patches ─▶ buffer new state
//!     has_more_patches ─▶ stays pending, unless the version did not move
//!     error ─▶ reset state, retry up to max_sync_attempts times
//!   commit
//! ```
//!
//! Collections are applied one at a time under the account-wide lock, so a
//! concurrent `app_patch` never encodes against a half-applied state.

use std::collections::HashMap;

use tracing::{debug, info, warn};
use wamd_core::{
    Environment, KeyStore, TransactionalStore,
    app_state::{
        ChatModification, CollectionName, LtHashState, Mutation, MutationMap, PatchCreate,
        decode_patches, decode_snapshot, encode_patch, load_lt_hash_state, store_lt_hash_state,
    },
    store::Transaction,
};

use crate::{
    config::SyncConfig,
    error::SyncError,
    transport::{SyncRequest, SyncTransport},
};

/// Lock label shared by every app-state operation of the account
const ACCOUNT_LOCK: &str = "app-state";

/// Result of [`AppStateSync::app_patch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPatchOutcome {
    /// The local change as applied
    pub mutation: Mutation,
    /// Remote changes picked up by the resync that preceded the push
    pub remote: MutationMap,
}

/// Keeps local collection states in step with the server.
#[derive(Debug)]
pub struct AppStateSync<S, T, E> {
    store: TransactionalStore<S>,
    transport: T,
    env: E,
    config: SyncConfig,
    app_state_key_id: Option<String>,
}

struct Fetched {
    version: u64,
    has_more_patches: bool,
    mutations: MutationMap,
}

impl<S, T, E> AppStateSync<S, T, E>
where
    S: KeyStore,
    T: SyncTransport,
    E: Environment,
{
    /// Sync engine over `store` and `transport`.
    pub fn new(store: S, transport: T, env: E, config: SyncConfig) -> Self {
        Self {
            store: TransactionalStore::new(store),
            transport,
            env,
            config,
            app_state_key_id: None,
        }
    }

    /// Use `key_id` (base64) for patches encoded from now on.
    pub fn set_app_state_key_id(&mut self, key_id: impl Into<String>) {
        self.app_state_key_id = Some(key_id.into());
    }

    /// Key id used for new patches, if any.
    pub fn app_state_key_id(&self) -> Option<&str> {
        self.app_state_key_id.as_deref()
    }

    /// Active configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Bring `collections` up to date and return the mutations they carried.
    ///
    /// A failing collection is reset and retried up to `max_sync_attempts`
    /// times, then abandoned; one whose key is missing is abandoned at
    /// once. The others still complete and are committed.
    ///
    /// # Errors
    ///
    /// - `Transport` if a fetch fails; nothing is committed
    /// - `Stalled` if the server promises more patches but sends none
    /// - `Store` if reading state or committing fails
    pub async fn resync(&self, collections: &[CollectionName]) -> Result<MutationMap, SyncError> {
        let mut tx = self.store.begin(ACCOUNT_LOCK).await;
        let mutations = self.resync_in(&mut tx, collections).await?;
        tx.commit().await?;
        Ok(mutations)
    }

    /// Apply a local change: resync its collection, encode, push, persist.
    ///
    /// # Errors
    ///
    /// - `NoAppStateKey` if no key id was set
    /// - `AppState` if encoding fails (unknown key, removing a dead index)
    /// - `Transport` if the push fails; local state is left as it was
    pub async fn app_patch(&self, create: PatchCreate) -> Result<AppPatchOutcome, SyncError> {
        let Some(key_id) = self.app_state_key_id.as_deref() else {
            return Err(SyncError::NoAppStateKey);
        };
        let collection = create.collection;

        let mut tx = self.store.begin(ACCOUNT_LOCK).await;
        let remote = self.resync_in(&mut tx, &[collection]).await?;

        let state = load_lt_hash_state(&tx, collection).await?.unwrap_or_default();
        let encoded = encode_patch(&create, key_id, &state, &tx, &self.env)
            .await
            .map_err(SyncError::app_state(collection))?;
        let version = encoded.state.version;

        self.transport.push(collection, version, encoded.patch).await?;

        store_lt_hash_state(&mut tx, collection, Some(&encoded.state))?;
        tx.commit().await?;

        info!(%collection, version, index = ?encoded.mutation.index, "pushed app-state patch");
        Ok(AppPatchOutcome { mutation: encoded.mutation, remote })
    }

    /// Apply a chat modification to `jid` through [`Self::app_patch`].
    ///
    /// `timestamp` stamps the action, in milliseconds since the epoch.
    ///
    /// # Errors
    ///
    /// Same as [`Self::app_patch`].
    pub async fn chat_modify(
        &self,
        modification: &ChatModification,
        jid: &str,
        timestamp: i64,
    ) -> Result<AppPatchOutcome, SyncError> {
        self.app_patch(modification.to_patch_create(jid, timestamp)).await
    }

    async fn resync_in(
        &self,
        tx: &mut Transaction<S>,
        collections: &[CollectionName],
    ) -> Result<MutationMap, SyncError> {
        let mut pending: Vec<CollectionName> = Vec::new();
        for &collection in collections {
            if !pending.contains(&collection) {
                pending.push(collection);
            }
        }

        let mut attempts: HashMap<CollectionName, u32> = HashMap::new();
        let mut minimum_versions: HashMap<CollectionName, u64> = HashMap::new();
        let mut mutations = MutationMap::new();

        while !pending.is_empty() {
            let mut remaining = Vec::new();

            for collection in pending {
                let state = load_lt_hash_state(tx, collection).await?.unwrap_or_default();
                let minimum_version = *minimum_versions.entry(collection).or_insert(state.version);
                let start_version = state.version;

                match self.fetch_and_apply(tx, collection, state, minimum_version).await {
                    Ok(fetched) => {
                        mutations.extend(fetched.mutations);
                        minimum_versions.insert(collection, fetched.version);

                        if !fetched.has_more_patches {
                            debug!(%collection, "collection up to date");
                        } else if fetched.version == start_version {
                            return Err(SyncError::Stalled { collection, version: start_version });
                        } else {
                            remaining.push(collection);
                        }
                    }
                    Err(SyncError::AppState { source, .. }) => {
                        store_lt_hash_state(tx, collection, None)?;

                        let retries = attempts.entry(collection).or_insert(0);
                        if source.is_key_missing() || *retries >= self.config.max_sync_attempts {
                            warn!(%collection, retries = *retries, error = %source, "giving up");
                        } else {
                            *retries += 1;
                            warn!(
                                %collection,
                                retries = *retries,
                                error = %source,
                                "collection reset"
                            );
                            remaining.push(collection);
                        }
                    }
                    Err(e) => return Err(e),
                }
            }

            pending = remaining;
        }

        Ok(mutations)
    }

    async fn fetch_and_apply(
        &self,
        tx: &mut Transaction<S>,
        collection: CollectionName,
        mut state: LtHashState,
        minimum_version: u64,
    ) -> Result<Fetched, SyncError> {
        let request =
            SyncRequest { collection, version: state.version, return_snapshot: state.version == 0 };
        let response = self.transport.fetch(request).await?;

        let verify = self.config.mac_verification;
        let mut mutations = MutationMap::new();

        if let Some(snapshot) = &response.snapshot {
            let decoded =
                decode_snapshot(snapshot, collection, &*tx, Some(minimum_version), verify.snapshot)
                    .await
                    .map_err(SyncError::app_state(collection))?;
            state = decoded.state;
            mutations.extend(decoded.mutations);
        }

        if !response.patches.is_empty() {
            let patches = &response.patches;
            let decoded =
                decode_patches(collection, patches, &state, &*tx, Some(minimum_version), verify)
                    .await
                    .map_err(SyncError::app_state(collection))?;
            state = decoded.state;
            mutations.extend(decoded.mutations);
        }

        store_lt_hash_state(tx, collection, Some(&state))?;

        debug!(
            %collection,
            version = state.version,
            snapshot = response.snapshot.is_some(),
            patches = response.patches.len(),
            mutations = mutations.len(),
            "applied collection changes"
        );
        let version = state.version;
        Ok(Fetched { version, has_more_patches: response.has_more_patches, mutations })
    }
}
