//! # Sluice Core
//!
//! Shared building blocks for the sluice memoization crates.
//!
//! - **Errors**: construction and configuration failures
//! - **Config**: TTL cache settings loadable from code, JSON, or the environment
//! - **Stats**: lock-free hit/miss accounting
//! - **Traits**: the `Fetcher` seam a cache calls on a miss
//!
//! ## Example
//!
//! ```rust
//! use sluice_core::HitMissCounter;
//!
//! let stats = HitMissCounter::new();
//! stats.hit();
//! stats.miss();
//! assert_eq!(stats.to_string(), "Hits: 1, Misses: 1, HitRate: 0.50");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod config;
pub mod error;
pub mod stats;
pub mod traits;

pub use config::CacheConfig;
pub use error::{Result, SluiceError};
pub use stats::{HitMissCounter, NoStats, StatsRecorder, StatsSnapshot};
pub use traits::{fetch_fn, FetchFn, Fetcher};
