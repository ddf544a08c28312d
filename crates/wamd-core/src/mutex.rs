//! Per-key async mutual exclusion
//!
//! Sender key records and app-state collections are read, mutated and
//! written back. Two such sequences for the same key must not interleave,
//! while unrelated keys proceed in parallel. Entries exist only while some
//! task holds or waits for the key.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::OwnedMutexGuard;

struct Entry {
    lock: Arc<tokio::sync::Mutex<()>>,
    refs: usize,
}

type Entries<K> = Arc<Mutex<HashMap<K, Entry>>>;

/// Map of lazily created async mutexes, one per key.
pub struct KeyedMutex<K> {
    entries: Entries<K>,
}

impl<K> Clone for KeyedMutex<K> {
    fn clone(&self) -> Self {
        Self { entries: Arc::clone(&self.entries) }
    }
}

impl<K> Default for KeyedMutex<K> {
    fn default() -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())) }
    }
}

impl<K> std::fmt::Debug for KeyedMutex<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedMutex").finish_non_exhaustive()
    }
}

impl<K> KeyedMutex<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Empty mutex map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and take it.
    ///
    /// Waiters are served in FIFO order. Dropping the returned guard releases
    /// the key; dropping the future while waiting gives up the place in line.
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let (lock, lease) = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry { lock: Arc::new(tokio::sync::Mutex::new(())), refs: 0 });
            entry.refs += 1;
            (Arc::clone(&entry.lock), Lease { key, entries: Arc::clone(&self.entries) })
        };

        let guard = lock.lock_owned().await;
        KeyedGuard { _guard: guard, _lease: lease }
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Proof of exclusive access to one key.
#[must_use = "the key is released as soon as the guard is dropped"]
pub struct KeyedGuard<K: Eq + Hash> {
    // Field order matters: the mutex is released before the entry is retired
    _guard: OwnedMutexGuard<()>,
    _lease: Lease<K>,
}

struct Lease<K: Eq + Hash> {
    key: K,
    entries: Entries<K>,
}

impl<K: Eq + Hash> Drop for Lease<K> {
    fn drop(&mut self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let mutex = KeyedMutex::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let guard = mutex.lock("group").await;

        let waiter = {
            let mutex = mutex.clone();
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let _guard = mutex.lock("group").await;
                log.lock().unwrap().push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        log.lock().unwrap().push("first");
        drop(guard);

        waiter.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let mutex = KeyedMutex::new();
        let _a = mutex.lock(1u32).await;
        let _b = mutex.lock(2u32).await;
        assert_eq!(mutex.active_keys(), 2);
    }

    #[tokio::test]
    async fn entries_are_retired_after_release() {
        let mutex = KeyedMutex::new();
        {
            let _guard = mutex.lock("k".to_string()).await;
            assert_eq!(mutex.active_keys(), 1);
        }
        assert_eq!(mutex.active_keys(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_releases_its_place() {
        let mutex = KeyedMutex::new();
        let guard = mutex.lock(9u8).await;

        let pending = mutex.lock(9u8);
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());

        drop(guard);
        assert_eq!(mutex.active_keys(), 0);
    }
}
