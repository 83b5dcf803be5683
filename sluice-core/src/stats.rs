//! Hit/miss accounting.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Sink for the cache's hit/miss branch point.
///
/// A cache is generic over its recorder, so a cache built with [`NoStats`]
/// carries no counters and exposes no statistics accessors.
pub trait StatsRecorder: Default + Send + Sync + 'static {
    /// A read was served from a fresh entry.
    fn record_hit(&self);

    /// A read had to run the fetcher.
    fn record_miss(&self);

    /// Zeroes whatever has been recorded.
    fn reset(&self);
}

/// Thread-safe hit/miss tally.
///
/// The two counters are independent atomics; no lock is taken on either
/// path. Readers combining both counts may observe them mid-update, which
/// only skews a concurrently computed hit rate by one sample.
#[derive(Debug, Default)]
pub struct HitMissCounter {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HitMissCounter {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a hit.
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a miss.
    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of hits so far.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of misses so far.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// `hits / (hits + misses)`, or `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        rate(self.hits(), self.misses())
    }

    /// Zeroes both counters.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let hits = self.hits();
        let misses = self.misses();
        StatsSnapshot {
            hits,
            misses,
            hit_rate: rate(hits, misses),
        }
    }
}

impl StatsRecorder for HitMissCounter {
    fn record_hit(&self) {
        self.hit();
    }

    fn record_miss(&self) {
        self.miss();
    }

    fn reset(&self) {
        HitMissCounter::reset(self);
    }
}

impl fmt::Display for HitMissCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.snapshot(), f)
    }
}

/// Recorder that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoStats;

impl StatsRecorder for NoStats {
    fn record_hit(&self) {}

    fn record_miss(&self) {}

    fn reset(&self) {}
}

/// Point-in-time statistics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Reads served from a fresh entry
    pub hits: u64,
    /// Reads that ran the fetcher
    pub misses: u64,
    /// `hits / (hits + misses)`
    pub hit_rate: f64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Hits: {}, Misses: {}, HitRate: {:.2}",
            self.hits, self.misses, self.hit_rate
        )
    }
}

fn rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
