//! Single-flight TTL cache.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, instrument, trace, Instrument};

use sluice_core::config::CacheConfig;
use sluice_core::error::Result;
use sluice_core::stats::{HitMissCounter, StatsRecorder, StatsSnapshot};
use sluice_core::traits::Fetcher;

use crate::builder::CacheBuilder;
use crate::key_mutex::KeyMutex;

/// A stored value and the moment its fetch started.
#[derive(Clone, Debug)]
pub struct Cached<V> {
    value: V,
    stored_at: Instant,
}

impl<V> Cached<V> {
    /// Wraps a value stored now.
    pub fn new(value: V) -> Self {
        Self::with_timestamp(value, Instant::now())
    }

    /// Wraps a value stored at `stored_at`.
    pub fn with_timestamp(value: V, stored_at: Instant) -> Self {
        Self { value, stored_at }
    }

    /// The cached value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Unwraps the cached value.
    pub fn into_value(self) -> V {
        self.value
    }

    /// When the value was stored.
    pub fn stored_at(&self) -> Instant {
        self.stored_at
    }

    /// Time since the value was stored.
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    /// Returns true while the value is younger than `expiration`.
    pub fn is_fresh(&self, expiration: Duration) -> bool {
        self.age() < expiration
    }
}

/// Memoizes a [`Fetcher`] per key for a fixed time-to-live.
///
/// Concurrent reads of a key that has no fresh value run the fetcher once:
/// the first reader fetches while holding the key's lock, the rest wait for
/// the lock and then find the fresh value.
///
/// The fetch runs on its own task and keeps the key locked until it has
/// finished and stored its result, so a reader that gives up mid-fetch
/// never causes a second fetch for the readers queued behind it.
///
/// Expired values are detected on read; nothing is swept in the background.
///
/// `S` selects statistics: the default [`HitMissCounter`] tracks hits and
/// misses, [`NoStats`](sluice_core::NoStats) tracks nothing.
///
/// Clones share the same storage.
pub struct Cache<K, V, F, S = HitMissCounter> {
    shared: Arc<Shared<K, V, F, S>>,
}

pub(crate) struct Shared<K, V, F, S> {
    locks: KeyMutex<K>,
    values: DashMap<K, Cached<V>>,
    stats: S,
    expiration: Duration,
    fetcher: F,
}

impl<K, V, F> Cache<K, V, F>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: Fetcher<K, V>,
{
    /// Creates a statistics-tracking cache.
    ///
    /// A zero `expiration` makes every read a miss.
    pub fn new(fetcher: F, expiration: Duration) -> Self {
        Self::from_shared(Shared::new(fetcher, expiration, 0, Vec::new()))
    }

    /// Starts a builder for a cache around `fetcher`.
    pub fn builder(fetcher: F) -> CacheBuilder<K, V, F> {
        CacheBuilder::new(fetcher)
    }

    /// Creates a statistics-tracking cache from a validated configuration.
    pub fn from_config(fetcher: F, config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        Self::builder(fetcher).config(config).build()
    }
}

impl<K, V, F, S> Cache<K, V, F, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: Fetcher<K, V>,
    S: StatsRecorder,
{
    pub(crate) fn from_shared(shared: Shared<K, V, F, S>) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Returns the value for `key`, fetching it if absent or expired.
    ///
    /// A fetch error is returned as is to this caller and nothing is
    /// stored; a previously stored value stays in place. Callers queued on
    /// the same key then run their own fetch.
    ///
    /// Dropping the returned future while it waits for the key withdraws the
    /// caller. Dropping it after the fetch started does not abort the fetch.
    /// If the fetcher panics, the key is released and the panic resumes here.
    ///
    /// # Panics
    ///
    /// Panics when polled outside a tokio runtime, since a miss spawns the
    /// fetch as a task. Also panics if the runtime shuts down before the
    /// fetch task completes, and re-raises a panic from the fetcher.
    #[instrument(level = "debug", skip_all)]
    pub async fn get(&self, key: K) -> std::result::Result<V, F::Error> {
        let guard = self.shared.locks.lock(&key).await;

        if let Some(value) = self.shared.fresh_value(&key) {
            self.shared.stats.record_hit();
            trace!("cache hit");
            return Ok(value);
        }

        self.shared.stats.record_miss();
        debug!("cache miss, fetching");

        let shared = Arc::clone(&self.shared);
        let fetch = tokio::spawn(
            async move {
                let result = shared.refresh(key).await;
                guard.unlock();
                result
            }
            .in_current_span(),
        );

        match fetch.await {
            Ok(result) => result,
            Err(err) => match err.try_into_panic() {
                Ok(payload) => std::panic::resume_unwind(payload),
                // Only reachable while the runtime shuts down.
                Err(err) => panic!("fetch task did not complete: {err}"),
            },
        }
    }

    /// Stores `value` for `key` as if it had just been fetched.
    pub async fn warmup(&self, key: K, value: V) {
        let _guard = self.shared.locks.lock(&key).await;
        self.shared.values.insert(key, Cached::new(value));
        trace!("entry warmed up");
    }

    /// Drops the stored value for `key`. Returns whether one existed.
    pub async fn invalidate(&self, key: &K) -> bool {
        let _guard = self.shared.locks.lock(key).await;
        let removed = self.shared.values.remove(key).is_some();
        trace!(removed, "entry invalidated");
        removed
    }

    /// Returns the stored entry for `key`, fresh or not.
    ///
    /// Never fetches, never waits for the key and is not counted in the
    /// statistics. Useful for serving a stale value after `get` failed.
    pub fn peek(&self, key: &K) -> Option<Cached<V>> {
        self.shared.values.get(key).map(|entry| entry.value().clone())
    }

    /// Drops every stored value and resets the statistics.
    ///
    /// Per-key locks stay registered. Reads in flight are not disturbed; a
    /// fetch completing after the clear stores its result as usual.
    pub fn clear(&self) {
        self.shared.values.clear();
        self.shared.stats.reset();
        debug!("cache cleared");
    }

    /// Number of stored values, expired ones included.
    pub fn len(&self) -> usize {
        self.shared.values.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.shared.values.is_empty()
    }

    /// Number of keys with a registered lock.
    pub fn lock_count(&self) -> usize {
        self.shared.locks.len()
    }

    /// The configured time-to-live.
    pub fn expiration(&self) -> Duration {
        self.shared.expiration
    }
}

impl<K, V, F> Cache<K, V, F, HitMissCounter> {
    /// Renders `"Hits: <n>, Misses: <n>, HitRate: <rate>"`.
    pub fn stats(&self) -> String {
        self.shared.stats.to_string()
    }

    /// Fraction of reads served from a fresh entry.
    pub fn hit_rate(&self) -> f64 {
        self.shared.stats.hit_rate()
    }

    /// Point-in-time statistics.
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl<K, V, F, S> Clone for Cache<K, V, F, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V, F, S> Shared<K, V, F, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: Fetcher<K, V>,
    S: StatsRecorder,
{
    pub(crate) fn new(
        fetcher: F,
        expiration: Duration,
        capacity: usize,
        initial_values: Vec<(K, Cached<V>)>,
    ) -> Self {
        let values = DashMap::with_capacity(capacity.max(initial_values.len()));
        for (key, entry) in initial_values {
            values.insert(key, entry);
        }

        Self {
            locks: KeyMutex::with_capacity(capacity),
            values,
            stats: S::default(),
            expiration,
            fetcher,
        }
    }

    fn fresh_value(&self, key: &K) -> Option<V> {
        self.values
            .get(key)
            .filter(|entry| entry.is_fresh(self.expiration))
            .map(|entry| entry.value.clone())
    }

    /// Runs the fetcher and stores a successful result.
    ///
    /// Must be called with the key's lock held.
    async fn refresh(&self, key: K) -> std::result::Result<V, F::Error> {
        let stored_at = Instant::now();
        match self.fetcher.fetch(key.clone()).await {
            Ok(value) => {
                self.values
                    .insert(key, Cached::with_timestamp(value.clone(), stored_at));
                debug!(elapsed = ?stored_at.elapsed(), "fetch stored");
                Ok(value)
            }
            Err(err) => {
                debug!("fetch failed, previous entry kept");
                Err(err)
            }
        }
    }
}
