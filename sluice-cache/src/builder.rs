//! Cache construction.

use std::hash::Hash;
use std::marker::PhantomData;
use std::time::Duration;

use sluice_core::config::CacheConfig;
use sluice_core::error::{Result, SluiceError};
use sluice_core::stats::{HitMissCounter, NoStats, StatsRecorder};
use sluice_core::traits::Fetcher;

use crate::cache::{Cache, Cached, Shared};

/// Builder for [`Cache`].
///
/// The expiration is required; [`build`](Self::build) fails without one.
pub struct CacheBuilder<K, V, F, S = HitMissCounter> {
    fetcher: F,
    expiration: Option<Duration>,
    initial_capacity: usize,
    initial_values: Vec<(K, Cached<V>)>,
    _stats: PhantomData<fn() -> S>,
}

impl<K, V, F> CacheBuilder<K, V, F> {
    /// Starts a statistics-tracking builder.
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            expiration: None,
            initial_capacity: 0,
            initial_values: Vec::new(),
            _stats: PhantomData,
        }
    }
}

impl<K, V, F, S> CacheBuilder<K, V, F, S> {
    /// Sets the time-to-live of stored values.
    pub fn expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Preallocates room for `capacity` keys. Not an upper bound.
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Seeds the cache. Each entry keeps its own timestamp, so seeded values
    /// expire like fetched ones.
    pub fn initial_values<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, Cached<V>)>,
    {
        self.initial_values.extend(values);
        self
    }

    /// Applies the expiration and capacity from `config`.
    pub fn config(self, config: &CacheConfig) -> Self {
        self.expiration(config.expiration())
            .initial_capacity(config.initial_capacity)
    }

    /// Switches to a cache that keeps no statistics.
    pub fn without_stats(self) -> CacheBuilder<K, V, F, NoStats> {
        CacheBuilder {
            fetcher: self.fetcher,
            expiration: self.expiration,
            initial_capacity: self.initial_capacity,
            initial_values: self.initial_values,
            _stats: PhantomData,
        }
    }
}

impl<K, V, F, S> CacheBuilder<K, V, F, S>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: Fetcher<K, V>,
    S: StatsRecorder,
{
    /// Builds the cache.
    pub fn build(self) -> Result<Cache<K, V, F, S>> {
        let expiration = self.expiration.ok_or(SluiceError::MissingExpiration)?;
        Ok(Cache::from_shared(Shared::new(
            self.fetcher,
            expiration,
            self.initial_capacity,
            self.initial_values,
        )))
    }
}
