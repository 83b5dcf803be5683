//! # Sluice Cache
//!
//! Single-flight TTL memoization for async fetches.
//!
//! ## Features
//!
//! - **Single flight**: concurrent misses on one key run the fetcher once
//! - **Lazy expiry**: values older than the TTL are refetched on read
//! - **Per-key locking**: different keys never wait on each other
//! - **Detached fetches**: a caller giving up does not abort a fetch others wait on
//!
//! ## Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use sluice_cache::Cache;
//! use sluice_core::fetch_fn;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let calls = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&calls);
//! let cache = Cache::new(
//!     fetch_fn(move |key: u32| {
//!         let counter = Arc::clone(&counter);
//!         async move {
//!             tokio::time::sleep(Duration::from_millis(10)).await;
//!             counter.fetch_add(1, Ordering::SeqCst);
//!             Ok::<_, std::io::Error>(key)
//!         }
//!     }),
//!     Duration::from_millis(50),
//! );
//!
//! let reads = (0..10).map(|_| cache.get(1));
//! futures::future::join_all(reads).await;
//!
//! assert_eq!(calls.load(Ordering::SeqCst), 1);
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod builder;
mod cache;
mod key_mutex;

pub use builder::CacheBuilder;
pub use cache::{Cache, Cached};
pub use key_mutex::{KeyGuard, KeyMutex};
