use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use super::{KeyNamespace, KeyStore, StoreError, StoreWrite};

/// In-memory key store for testing and simulation
///
/// All state sits behind one `Arc<Mutex<>>`, so clones see the same entries
/// and [`KeyStore::set_many`] is atomic.
#[derive(Clone, Default)]
pub struct MemoryKeyStore {
    inner: Arc<Mutex<HashMap<(KeyNamespace, String), Vec<u8>>>>,
}

impl MemoryKeyStore {
    /// Create a new empty `MemoryKeyStore`
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in `namespace`.
    pub fn count(&self, namespace: KeyNamespace) -> usize {
        self.entries().keys().filter(|(ns, _)| *ns == namespace).count()
    }

    /// Ids stored in `namespace`, sorted.
    pub fn ids(&self, namespace: KeyNamespace) -> Vec<String> {
        let entries = self.entries();
        let mut ids: Vec<String> =
            entries.keys().filter(|(ns, _)| *ns == namespace).map(|(_, id)| id.clone()).collect();
        ids.sort();
        ids
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<(KeyNamespace, String), Vec<u8>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeyStore").field("entries", &self.entries().len()).finish()
    }
}

impl KeyStore for MemoryKeyStore {
    async fn get(&self, namespace: KeyNamespace, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries().get(&(namespace, id.to_string())).cloned())
    }

    async fn set(
        &self,
        namespace: KeyNamespace,
        id: &str,
        value: Option<Vec<u8>>,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries();
        match value {
            Some(bytes) => entries.insert((namespace, id.to_string()), bytes),
            None => entries.remove(&(namespace, id.to_string())),
        };
        Ok(())
    }

    async fn set_many(&self, writes: Vec<StoreWrite>) -> Result<(), StoreError> {
        let mut entries = self.entries();
        for write in writes {
            match write.value {
                Some(bytes) => entries.insert((write.namespace, write.id), bytes),
                None => entries.remove(&(write.namespace, write.id)),
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_entries() {
        let store = MemoryKeyStore::new();
        let clone = store.clone();

        store.set(KeyNamespace::AppStateSyncKey, "AAE=", Some(vec![9])).await.unwrap();

        assert_eq!(clone.get(KeyNamespace::AppStateSyncKey, "AAE=").await.unwrap(), Some(vec![9]));
        assert_eq!(clone.count(KeyNamespace::AppStateSyncKey), 1);
        assert_eq!(clone.count(KeyNamespace::SenderKey), 0);
    }

    #[tokio::test]
    async fn namespaces_are_disjoint() {
        let store = MemoryKeyStore::new();
        store.set(KeyNamespace::SenderKey, "x", Some(vec![1])).await.unwrap();
        store.set(KeyNamespace::AppStateVersion, "x", Some(vec![2])).await.unwrap();

        assert_eq!(store.get(KeyNamespace::SenderKey, "x").await.unwrap(), Some(vec![1]));
        assert_eq!(store.ids(KeyNamespace::AppStateVersion), vec!["x".to_string()]);
    }
}
