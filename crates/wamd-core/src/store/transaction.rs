use std::collections::BTreeMap;

use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use super::{KeyNamespace, KeyStore, StoreError, StoreWrite, encode_value};
use crate::mutex::{KeyedGuard, KeyedMutex};

/// Store wrapper that hands out label-serialized transactions.
///
/// Two transactions with the same label never overlap; the second `begin`
/// waits until the first commits or is dropped.
#[derive(Debug, Clone)]
pub struct TransactionalStore<S> {
    store: S,
    locks: KeyedMutex<String>,
}

impl<S: KeyStore> TransactionalStore<S> {
    /// Wrap `store`.
    pub fn new(store: S) -> Self {
        Self { store, locks: KeyedMutex::new() }
    }

    /// Underlying store, for reads and writes outside a transaction.
    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Wait for exclusive use of `label` and open a transaction.
    pub async fn begin(&self, label: &str) -> Transaction<S> {
        let guard = self.locks.lock(label.to_string()).await;
        debug!(label, "transaction started");
        Transaction {
            store: self.store.clone(),
            label: label.to_string(),
            writes: BTreeMap::new(),
            _guard: guard,
        }
    }
}

/// Buffered set of writes, committed atomically.
///
/// Reads see the transaction's own pending writes first. Dropping the
/// transaction without [`Transaction::commit`] discards every write.
pub struct Transaction<S> {
    store: S,
    label: String,
    writes: BTreeMap<(KeyNamespace, String), Option<Vec<u8>>>,
    _guard: KeyedGuard<String>,
}

impl<S: KeyStore> Transaction<S> {
    /// Read an entry, preferring this transaction's pending write.
    pub async fn get(
        &self,
        namespace: KeyNamespace,
        id: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(pending) = self.writes.get(&(namespace, id.to_string())) {
            return Ok(pending.clone());
        }
        self.store.get(namespace, id).await
    }

    /// Buffer a write or delete (`None`).
    pub fn set(&mut self, namespace: KeyNamespace, id: &str, value: Option<Vec<u8>>) {
        self.writes.insert((namespace, id.to_string()), value);
    }

    /// Read and CBOR-decode an entry.
    pub async fn load<T: DeserializeOwned>(
        &self,
        namespace: KeyNamespace,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let Some(bytes) = self.get(namespace, id).await? else {
            return Ok(None);
        };
        ciborium::from_reader(bytes.as_slice())
            .map(Some)
            .map_err(|e| StoreError::Codec { namespace, id: id.to_string(), reason: e.to_string() })
    }

    /// CBOR-encode and buffer a value.
    pub fn store<T: Serialize>(
        &mut self,
        namespace: KeyNamespace,
        id: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = encode_value(namespace, id, value)?;
        self.set(namespace, id, Some(bytes));
        Ok(())
    }

    /// Buffer a delete.
    pub fn delete(&mut self, namespace: KeyNamespace, id: &str) {
        self.set(namespace, id, None);
    }

    /// Number of buffered writes.
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Label this transaction serializes on.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Apply every buffered write in one [`KeyStore::set_many`] call.
    pub async fn commit(self) -> Result<(), StoreError> {
        let count = self.writes.len();
        let writes = self
            .writes
            .into_iter()
            .map(|((namespace, id), value)| StoreWrite { namespace, id, value })
            .collect();

        self.store.set_many(writes).await?;
        debug!(label = %self.label, writes = count, "transaction committed");
        Ok(())
    }
}

impl<S> std::fmt::Debug for Transaction<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("label", &self.label)
            .field("pending_writes", &self.writes.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::store::MemoryKeyStore;

    #[tokio::test]
    async fn reads_see_pending_writes() {
        let store = TransactionalStore::new(MemoryKeyStore::new());
        let mut tx = store.begin("account").await;

        tx.set(KeyNamespace::AppStateVersion, "regular", Some(vec![1]));

        assert_eq!(tx.get(KeyNamespace::AppStateVersion, "regular").await.unwrap(), Some(vec![1]));
        let committed = store.inner().get(KeyNamespace::AppStateVersion, "regular").await;
        assert_eq!(committed.unwrap(), None);
    }

    #[tokio::test]
    async fn commit_applies_all_writes() {
        let store = TransactionalStore::new(MemoryKeyStore::new());
        let inner = store.inner();
        inner.set(KeyNamespace::AppStateVersion, "regular_low", Some(vec![9])).await.unwrap();

        let mut tx = store.begin("account").await;
        tx.store(KeyNamespace::AppStateVersion, "regular", &5u64).unwrap();
        tx.delete(KeyNamespace::AppStateVersion, "regular_low");
        assert_eq!(tx.pending_writes(), 2);
        tx.commit().await.unwrap();

        assert_eq!(inner.ids(KeyNamespace::AppStateVersion), vec!["regular".to_string()]);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = TransactionalStore::new(MemoryKeyStore::new());
        {
            let mut tx = store.begin("account").await;
            tx.set(KeyNamespace::SenderKey, "g::a::1", Some(vec![1, 2, 3]));
        }

        assert_eq!(store.inner().count(KeyNamespace::SenderKey), 0);
        // The label is free again
        let tx = store.begin("account").await;
        assert_eq!(tx.label(), "account");
    }

    #[tokio::test]
    async fn same_label_waits_for_commit() {
        let store = TransactionalStore::new(MemoryKeyStore::new());
        let first = store.begin("account").await;
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let second = {
            let store = store.clone();
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                let tx = store.begin("account").await;
                order.lock().unwrap().push("second");
                tx.commit().await.unwrap();
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        order.lock().unwrap().push("first");
        first.commit().await.unwrap();

        second.await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }
}
