//! Lazily created per-key async locks.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of exclusive locks, one per key.
///
/// Locks are created on first use through an atomic get-or-insert on a
/// sharded concurrent map. The shard lock is held only for that lookup, never
/// while a caller holds a key lock, so callers on different keys only meet
/// for the O(1) registry touch.
///
/// Registered locks are never removed; the registry grows with the number of
/// distinct keys for the lifetime of its owner.
pub struct KeyMutex<K> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> fmt::Debug for KeyMutex<K>
where
    K: Hash + Eq + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMutex").field("locks", &self.locks).finish()
    }
}

/// Exclusive hold on one key. Released on drop.
#[derive(Debug)]
#[must_use = "the key is unlocked as soon as the guard is dropped"]
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    /// Releases the key.
    pub fn unlock(self) {}
}

impl<K> KeyMutex<K>
where
    K: Hash + Eq + Clone,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Creates a registry with room for `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            locks: DashMap::with_capacity(capacity),
        }
    }

    /// Returns the lock for `key`, registering it if absent.
    pub fn acquire(&self, key: &K) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(key) {
            return Arc::clone(lock.value());
        }
        Arc::clone(self.locks.entry(key.clone()).or_default().value())
    }

    /// Waits for exclusive access to `key`.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the key
    /// untouched.
    pub async fn lock(&self, key: &K) -> KeyGuard {
        let lock = self.acquire(key);
        KeyGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Takes the key if nobody holds it.
    pub fn try_lock(&self, key: &K) -> Option<KeyGuard> {
        self.acquire(key)
            .try_lock_owned()
            .ok()
            .map(|guard| KeyGuard { _guard: guard })
    }

    /// Number of keys that have a registered lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns true if no lock has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K> Default for KeyMutex<K>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
