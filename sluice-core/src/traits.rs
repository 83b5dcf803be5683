//! Common traits for sluice.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

// ═══════════════════════════════════════════════════════════════════════════════
// FETCHER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// The expensive, key-driven computation a cache memoizes.
///
/// A cache calls `fetch` at most once per key per batch of concurrent
/// misses. The fetch runs detached from the caller that triggered it, so an
/// implementation must not rely on that caller still being alive.
///
/// Errors are returned to the triggering caller exactly as produced.
#[async_trait]
pub trait Fetcher<K, V>: Send + Sync + 'static
where
    K: Send + 'static,
    V: Send + 'static,
{
    /// Error produced by a failed fetch.
    type Error: Send + 'static;

    /// Computes the value for `key`.
    async fn fetch(&self, key: K) -> Result<V, Self::Error>;
}

/// A [`Fetcher`] backed by an async closure. Built with [`fetch_fn`].
#[derive(Clone)]
pub struct FetchFn<F> {
    f: F,
}

/// Wraps `f` so it can be used as a [`Fetcher`].
///
/// ```rust
/// use sluice_core::fetch_fn;
///
/// let fetcher = fetch_fn(|id: u32| async move { Ok::<_, std::io::Error>(id * 2) });
/// ```
pub fn fetch_fn<F>(f: F) -> FetchFn<F> {
    FetchFn { f }
}

#[async_trait]
impl<K, V, E, F, Fut> Fetcher<K, V> for FetchFn<F>
where
    K: Send + 'static,
    V: Send + 'static,
    E: Send + 'static,
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send,
{
    type Error = E;

    async fn fetch(&self, key: K) -> Result<V, E> {
        (self.f)(key).await
    }
}

impl<F> fmt::Debug for FetchFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchFn").finish_non_exhaustive()
    }
}
