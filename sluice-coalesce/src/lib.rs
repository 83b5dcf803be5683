//! # Sluice Coalesce
//!
//! Deduplicates near-simultaneous calls to one hot async operation.
//!
//! Unlike the TTL cache there is no key and no expiration: whether a call
//! reuses a result depends only on whether it arrived before the most
//! recent execution started.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use sluice_coalesce::Coalescer;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let coalescer: Coalescer<u64, String> = Coalescer::new();
//!
//! // Callers arriving during the 20ms delay share this execution.
//! let total = coalescer
//!     .run_delayed(Duration::from_millis(20), || async { Ok(42) })
//!     .await;
//! assert_eq!(total, Ok(42));
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod coalescer;

pub use coalescer::{Coalescer, CoalescerStats};
