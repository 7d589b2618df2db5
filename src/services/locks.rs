use std::{hash::Hash, sync::Arc};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// In-process async mutexes keyed by entity id.
///
/// Serializes read-check-write sequences for one key inside this process.
/// Separate processes still race; the store has to lock rows for that.
/// An entry lives only while some caller holds or waits for its mutex.
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: K) -> KeyedLockGuard<K> {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        KeyedLockGuard {
            key,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Held lock for one key. Dropping it releases the mutex and forgets the key
/// once nobody else is waiting on it.
#[derive(Debug)]
pub struct KeyedLockGuard<K: Eq + Hash> {
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash> Drop for KeyedLockGuard<K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // the map holds the last reference when no caller waits on the key
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
