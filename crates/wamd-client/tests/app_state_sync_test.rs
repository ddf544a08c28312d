//! App-state sync between devices through an in-memory server.
//!
//! These tests verify critical invariants:
//! - A patch pushed by one device is applied identically by another
//! - Paged responses are followed until `has_more_patches` is false
//! - Failing collections are reset and retried a bounded number of times
//! - A server that promises more patches without sending any stops the sync
//! - Snapshots are applied before the patches that follow them

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use wamd_client::{
    AppStateSync, SyncConfig, SyncError, SyncRequest, SyncResponse, SyncTransport, TransportError,
};
use wamd_core::{
    MemoryKeyStore, SeededEnv,
    app_state::{
        AppStateSyncKey, ChatAction, ChatModification, CollectionName, LtHashState, MutationKeys,
        PatchCreate, SyncAction, SyncdOperation, SyncdPatch, SyncdSnapshot, snapshot_mac,
        store_app_state_sync_key,
    },
    store::{KeyNamespace, load_value},
};

const KEY_ID: &[u8] = b"\x00\x00\x00\x07";
const KEY_DATA: [u8; 32] = [0x5a; 32];
const COLLECTION: CollectionName = CollectionName::RegularLow;

#[derive(Default)]
struct ServerState {
    patches: HashMap<CollectionName, Vec<SyncdPatch>>,
    snapshots: HashMap<CollectionName, SyncdSnapshot>,
    page_size: Option<usize>,
    reject_pushes: bool,
    stalled: bool,
    fetches: Vec<SyncRequest>,
}

/// Server that stores pushed patches and serves them back in order.
#[derive(Clone, Default)]
struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

impl MockServer {
    fn paged(page_size: usize) -> Self {
        let server = Self::default();
        server.state.lock().unwrap().page_size = Some(page_size);
        server
    }

    fn fetches(&self) -> Vec<SyncRequest> {
        self.state.lock().unwrap().fetches.clone()
    }

    fn patches(&self, collection: CollectionName) -> Vec<SyncdPatch> {
        self.state.lock().unwrap().patches.get(&collection).cloned().unwrap_or_default()
    }

    fn corrupt_patch_mac(&self, collection: CollectionName, index: usize) {
        let mut state = self.state.lock().unwrap();
        state.patches.get_mut(&collection).unwrap()[index].patch_mac[0] ^= 0xff;
    }

    fn reject_pushes(&self) {
        self.state.lock().unwrap().reject_pushes = true;
    }

    fn stall(&self) {
        self.state.lock().unwrap().stalled = true;
    }

    fn set_snapshot(&self, collection: CollectionName, snapshot: SyncdSnapshot) {
        self.state.lock().unwrap().snapshots.insert(collection, snapshot);
    }

    fn replace_patches(&self, collection: CollectionName, patches: Vec<SyncdPatch>) {
        self.state.lock().unwrap().patches.insert(collection, patches);
    }
}

impl SyncTransport for MockServer {
    async fn fetch(&self, request: SyncRequest) -> Result<SyncResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.fetches.push(request);

        let snapshot = if request.return_snapshot {
            state.snapshots.get(&request.collection).cloned()
        } else {
            None
        };
        let since = snapshot.as_ref().map_or(request.version, |snapshot| snapshot.version);

        let newer: Vec<SyncdPatch> = state
            .patches
            .get(&request.collection)
            .into_iter()
            .flatten()
            .filter(|patch| patch.version > since)
            .cloned()
            .collect();
        let page = state.page_size.unwrap_or(newer.len());

        if state.stalled {
            return Ok(SyncResponse { snapshot, patches: Vec::new(), has_more_patches: true });
        }

        Ok(SyncResponse {
            snapshot,
            has_more_patches: newer.len() > page,
            patches: newer.into_iter().take(page).collect(),
        })
    }

    async fn push(
        &self,
        collection: CollectionName,
        version: u64,
        patch: SyncdPatch,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.reject_pushes {
            return Err(TransportError("push rejected".into()));
        }
        let patches = state.patches.entry(collection).or_default();
        let expected = patches.last().map_or(1, |last| last.version + 1);
        if version != expected {
            let reason = format!("conflict: expected version {expected}, got {version}");
            return Err(TransportError(reason));
        }
        patches.push(patch);
        Ok(())
    }
}

type Device = AppStateSync<MemoryKeyStore, MockServer, SeededEnv>;

fn unkeyed(server: &MockServer, store: MemoryKeyStore, seed: u64) -> Device {
    AppStateSync::new(store, server.clone(), SeededEnv::new(seed), SyncConfig::default())
}

async fn device(server: &MockServer, seed: u64) -> (Device, MemoryKeyStore) {
    let store = MemoryKeyStore::new();
    let key = AppStateSyncKey::new(KEY_ID, KEY_DATA);
    store_app_state_sync_key(&store, &key).await.unwrap();

    let mut sync = unkeyed(server, store.clone(), seed);
    sync.set_app_state_key_id(key.key_id.clone());
    (sync, store)
}

fn mute(jid: &str) -> PatchCreate {
    PatchCreate {
        collection: COLLECTION,
        index: vec!["mute".to_string(), jid.to_string()],
        value: b"muted".to_vec(),
        api_version: 2,
        operation: SyncdOperation::Set,
    }
}

async fn stored_state(store: &MemoryKeyStore) -> Option<LtHashState> {
    load_value(store, KeyNamespace::AppStateVersion, COLLECTION.as_str()).await.unwrap()
}

#[tokio::test]
async fn pushed_patch_reaches_other_device() {
    let server = MockServer::default();
    let (phone, phone_store) = device(&server, 1).await;
    let (laptop, laptop_store) = device(&server, 2).await;

    let outcome = phone.app_patch(mute("123@s.whatsapp.net")).await.unwrap();
    assert!(outcome.remote.is_empty());
    assert_eq!(server.patches(COLLECTION).len(), 1);

    let mutations = laptop.resync(&[COLLECTION]).await.unwrap();
    let mutation = &mutations[r#"["mute","123@s.whatsapp.net"]"#];
    assert_eq!(mutation, &outcome.mutation);

    let phone_state = stored_state(&phone_store).await.unwrap();
    assert_eq!(phone_state.version, 1);
    assert_eq!(stored_state(&laptop_store).await, Some(phone_state));
}

#[tokio::test]
async fn app_patch_picks_up_remote_changes_first() {
    let server = MockServer::default();
    let (phone, _) = device(&server, 3).await;
    let (laptop, laptop_store) = device(&server, 4).await;

    phone.app_patch(mute("a@s.whatsapp.net")).await.unwrap();
    let outcome = laptop.app_patch(mute("b@s.whatsapp.net")).await.unwrap();

    assert!(outcome.remote.contains_key(r#"["mute","a@s.whatsapp.net"]"#));
    assert_eq!(stored_state(&laptop_store).await.unwrap().version, 2);
    assert_eq!(server.patches(COLLECTION).len(), 2);
}

#[tokio::test]
async fn paged_responses_are_followed() {
    let server = MockServer::paged(1);
    let (phone, _) = device(&server, 5).await;
    for jid in ["a", "b", "c"] {
        phone.app_patch(mute(jid)).await.unwrap();
    }

    let (laptop, laptop_store) = device(&server, 6).await;
    let mutations = laptop.resync(&[COLLECTION]).await.unwrap();

    assert_eq!(mutations.len(), 3);
    assert_eq!(stored_state(&laptop_store).await.unwrap().version, 3);
    let fetches = server.fetches();
    let versions: Vec<u64> = fetches.iter().rev().take(3).map(|request| request.version).collect();
    assert_eq!(versions, vec![2, 1, 0]);
}

#[tokio::test]
async fn chat_modification_reaches_other_device() {
    let server = MockServer::default();
    let (phone, _) = device(&server, 23).await;
    let (laptop, _) = device(&server, 24).await;
    let jid = "42@s.whatsapp.net";

    let pin = ChatModification::Pin { pinned: true };
    let outcome = phone.chat_modify(&pin, jid, 1_700_000_000_000).await.unwrap();
    assert_eq!(outcome.mutation.index, vec!["pin_v1", jid]);
    assert_eq!(server.patches(CollectionName::RegularLow).len(), 1);

    let mutations = laptop.resync(&[CollectionName::RegularLow]).await.unwrap();
    let mutation = &mutations[&format!(r#"["pin_v1","{jid}"]"#)];
    let action = SyncAction::from_mutation(mutation).unwrap().unwrap();
    assert_eq!(action.timestamp, Some(1_700_000_000_000));
    assert_eq!(action.action, ChatAction::Pin { jid: jid.to_string(), pinned: true });
}

#[tokio::test]
async fn already_seen_versions_are_not_surfaced_again() {
    let server = MockServer::default();
    let (phone, _) = device(&server, 7).await;
    let (laptop, _) = device(&server, 8).await;

    phone.app_patch(mute("a")).await.unwrap();
    assert_eq!(laptop.resync(&[COLLECTION]).await.unwrap().len(), 1);

    phone.app_patch(mute("b")).await.unwrap();
    let mutations = laptop.resync(&[COLLECTION]).await.unwrap();
    assert_eq!(mutations.len(), 1);
    assert!(mutations.contains_key(r#"["mute","b"]"#));
}

#[tokio::test]
async fn failing_collection_is_reset_and_abandoned() {
    let server = MockServer::default();
    let (phone, _) = device(&server, 9).await;
    phone.app_patch(mute("a")).await.unwrap();
    server.corrupt_patch_mac(COLLECTION, 0);

    let (laptop, laptop_store) = device(&server, 10).await;
    let collection_fetches =
        || server.fetches().iter().filter(|request| request.collection == COLLECTION).count();
    let fetched_before = collection_fetches();
    let mutations = laptop.resync(&[COLLECTION, CollectionName::Regular]).await.unwrap();

    assert!(mutations.is_empty());
    assert_eq!(stored_state(&laptop_store).await, None);

    // INVARIANT: the first try plus `max_sync_attempts` retries
    let attempts = collection_fetches() - fetched_before;
    assert_eq!(attempts, SyncConfig::default().max_sync_attempts as usize + 1);

    // The healthy collection still synced and was committed
    let regular: Option<LtHashState> =
        load_value(&laptop_store, KeyNamespace::AppStateVersion, CollectionName::Regular.as_str())
            .await
            .unwrap();
    assert_eq!(regular, Some(LtHashState::new()));
}

#[tokio::test]
async fn stalled_server_stops_the_sync() {
    let server = MockServer::default();
    let (phone, _) = device(&server, 21).await;
    phone.app_patch(mute("a")).await.unwrap();
    server.stall();

    let (laptop, laptop_store) = device(&server, 22).await;
    let before = server.fetches().len();
    let err = laptop.resync(&[COLLECTION]).await.unwrap_err();

    assert_eq!(err, SyncError::Stalled { collection: COLLECTION, version: 0 });
    assert_eq!(server.fetches().len(), before + 1);
    assert_eq!(stored_state(&laptop_store).await, None);
}

#[tokio::test]
async fn missing_key_gives_up_immediately() {
    let server = MockServer::default();
    let (phone, _) = device(&server, 11).await;
    phone.app_patch(mute("a")).await.unwrap();

    // A device that never received the key
    let stranger = unkeyed(&server, MemoryKeyStore::new(), 12);
    let before = server.fetches().len();
    assert!(stranger.resync(&[COLLECTION]).await.unwrap().is_empty());
    assert_eq!(server.fetches().len(), before + 1);
}

#[tokio::test]
async fn app_patch_without_key_id_fails() {
    let server = MockServer::default();
    let sync = unkeyed(&server, MemoryKeyStore::new(), 13);

    let err = sync.app_patch(mute("a")).await.unwrap_err();
    assert_eq!(err, SyncError::NoAppStateKey);
    assert!(server.fetches().is_empty());
}

#[tokio::test]
async fn snapshot_then_patches_on_first_sync() {
    let server = MockServer::default();
    let (phone, phone_store) = device(&server, 14).await;
    for jid in ["a", "b"] {
        phone.app_patch(mute(jid)).await.unwrap();
    }
    let at_two = stored_state(&phone_store).await.unwrap();
    phone.app_patch(mute("c")).await.unwrap();

    // Compact the first two patches into a snapshot
    let mut patches = server.patches(COLLECTION);
    let records = patches
        .drain(..2)
        .flat_map(|patch| patch.mutations)
        .map(|mutation| mutation.record)
        .collect();
    let keys = MutationKeys::derive(&KEY_DATA);
    let mac = snapshot_mac(&keys.snapshot_mac_key, &at_two.hash, 2, COLLECTION);
    let snapshot =
        SyncdSnapshot { version: 2, records, mac: mac.to_vec(), key_id: KEY_ID.to_vec() };
    server.set_snapshot(COLLECTION, snapshot);
    server.replace_patches(COLLECTION, patches);

    let (laptop, laptop_store) = device(&server, 15).await;
    let mutations = laptop.resync(&[COLLECTION]).await.unwrap();

    assert_eq!(mutations.len(), 3);
    assert_eq!(stored_state(&laptop_store).await, stored_state(&phone_store).await);
    assert!(server.fetches().last().unwrap().return_snapshot);
}

#[tokio::test]
async fn rejected_push_leaves_state_untouched() {
    let server = MockServer::default();
    let (phone, phone_store) = device(&server, 16).await;
    phone.app_patch(mute("a")).await.unwrap();
    let before = stored_state(&phone_store).await;

    server.reject_pushes();
    let err = phone.app_patch(mute("b")).await.unwrap_err();

    assert!(matches!(err, SyncError::Transport(_)));
    assert!(!err.is_fatal());
    assert_eq!(stored_state(&phone_store).await, before);
    assert_eq!(server.patches(COLLECTION).len(), 1);
}
