//! Arrival-order call coalescing.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

/// Collapses overlapping calls to one operation into a single execution.
///
/// A call that arrived before the most recent execution started reuses that
/// execution's outcome, even if it spent the whole execution waiting for the
/// lock. A call arriving later runs the operation itself. Outcomes never
/// expire on their own; only arrival order matters.
///
/// There is a single slot: every call is treated as a request for the same
/// thing, whatever closure it passes.
pub struct Coalescer<V, E> {
    state: Mutex<State<V, E>>,
    executions: AtomicU64,
    coalesced: AtomicU64,
}

struct State<V, E> {
    /// Start of the most recent completed execution.
    deadline: Option<Instant>,
    last: Option<Result<V, E>>,
}

/// Counters for a [`Coalescer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoalescerStats {
    /// Times the operation was started
    pub executions: u64,
    /// Calls answered with a previous execution's outcome
    pub coalesced: u64,
}

impl<V, E> Coalescer<V, E>
where
    V: Clone,
    E: Clone,
{
    /// Creates a coalescer with no recorded execution.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                deadline: None,
                last: None,
            }),
            executions: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Runs `op`, or reuses the outcome of an execution that started after
    /// this call arrived.
    pub async fn run<Op, Fut>(&self, op: Op) -> Result<V, E>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.run_delayed(Duration::ZERO, op).await
    }

    /// Like [`run`](Self::run), but an executing call first sleeps for
    /// `delay`.
    ///
    /// Calls arriving during the sleep queue on the lock with an arrival
    /// time earlier than the upcoming execution's start, so they all share
    /// its outcome.
    ///
    /// The new start time and outcome are recorded together once `op`
    /// completes. Dropping an executing call therefore keeps the previous
    /// record.
    #[instrument(level = "debug", skip_all, fields(delay = ?delay))]
    pub async fn run_delayed<Op, Fut>(&self, delay: Duration, op: Op) -> Result<V, E>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let arrived = Instant::now();
        let mut state = self.state.lock().await;

        if let (Some(deadline), Some(last)) = (state.deadline, state.last.as_ref()) {
            if deadline > arrived {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                trace!("reusing outcome of overlapping execution");
                return last.clone();
            }
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let started = Instant::now();
        self.executions.fetch_add(1, Ordering::Relaxed);
        debug!("executing coalesced operation");

        let outcome = op().await;
        state.deadline = Some(started);
        state.last = Some(outcome.clone());
        outcome
    }

    /// Returns the execution and reuse counts.
    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            executions: self.executions.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

impl<V, E> Default for Coalescer<V, E>
where
    V: Clone,
    E: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> fmt::Debug for Coalescer<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coalescer")
            .field("executions", &self.executions.load(Ordering::Relaxed))
            .field("coalesced", &self.coalesced.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    use futures::future::{join_all, BoxFuture};
    use futures::FutureExt;
    use test_case::test_case;

    const DELAY: Duration = Duration::from_millis(100);

    /// Counts executions; each one returns the new count after `work`.
    #[derive(Clone, Default)]
    struct Counter {
        count: Arc<AtomicU32>,
    }

    impl Counter {
        fn op(&self, work: Duration) -> impl FnOnce() -> BoxFuture<'static, Result<u32, String>> {
            let count = Arc::clone(&self.count);
            move || {
                async move {
                    if !work.is_zero() {
                        tokio::time::sleep(work).await;
                    }
                    Ok(count.fetch_add(1, Ordering::SeqCst) + 1)
                }
                .boxed()
            }
        }

        fn get(&self) -> u32 {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_callers_within_delay_share_one_execution() {
        let coalescer = Arc::new(Coalescer::new());
        let counter = Counter::default();

        let started = Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let coalescer = Arc::clone(&coalescer);
                let op = counter.op(Duration::ZERO);
                tokio::spawn(async move { coalescer.run_delayed(DELAY, op).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(1));
        }
        let elapsed = started.elapsed();

        assert_eq!(counter.get(), 1);
        assert!(elapsed >= DELAY, "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(105), "{elapsed:?}");
        assert_eq!(
            coalescer.stats(),
            CoalescerStats {
                executions: 1,
                coalesced: 2
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_callers_beyond_window_execute_separately() {
        let coalescer = Arc::new(Coalescer::new());
        let counter = Counter::default();
        let work = Duration::from_millis(50);

        let started = Instant::now();
        let first = {
            let coalescer = Arc::clone(&coalescer);
            let op = counter.op(work);
            tokio::spawn(async move { coalescer.run_delayed(DELAY, op).await })
        };
        tokio::time::sleep(Duration::from_millis(110)).await;
        let second = {
            let coalescer = Arc::clone(&coalescer);
            let op = counter.op(work);
            tokio::spawn(async move { coalescer.run_delayed(DELAY, op).await })
        };

        assert_eq!(first.await.unwrap(), Ok(1));
        assert_eq!(second.await.unwrap(), Ok(2));
        let elapsed = started.elapsed();

        assert_eq!(counter.get(), 2);
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(305), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_calls_each_execute() {
        let coalescer = Coalescer::new();
        let counter = Counter::default();

        assert_eq!(coalescer.run(counter.op(Duration::ZERO)).await, Ok(1));
        assert_eq!(coalescer.run(counter.op(Duration::ZERO)).await, Ok(2));
        assert_eq!(coalescer.stats().coalesced, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arrival_after_start_runs_again() {
        let coalescer = Coalescer::new();
        let counter = Counter::default();
        let work = Duration::from_millis(50);

        let late = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            coalescer.run(counter.op(work)).await
        };
        let (first, second) = tokio::join!(coalescer.run(counter.op(work)), late);

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_shared_with_coalesced_callers() {
        let coalescer: Coalescer<u32, String> = Coalescer::new();
        let attempts = Arc::new(AtomicU32::new(0));

        let calls = (0..3).map(|_| {
            let attempts = Arc::clone(&attempts);
            coalescer.run_delayed(DELAY, move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("upstream down".to_string())
            })
        });
        let results = join_all(calls).await;

        assert!(results.iter().all(|r| *r == Err("upstream down".to_string())));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        let recovered = coalescer.run(|| async { Ok(7) }).await;
        assert_eq!(recovered, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_executor_keeps_previous_outcome() {
        let coalescer = Coalescer::new();
        let counter = Counter::default();

        assert_eq!(coalescer.run(counter.op(Duration::ZERO)).await, Ok(1));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            coalescer.run(counter.op(Duration::from_millis(50))),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(counter.get(), 1);

        assert_eq!(coalescer.run(counter.op(Duration::ZERO)).await, Ok(2));
        assert_eq!(coalescer.stats().executions, 3);
    }

    #[test_case(1 ; "single caller")]
    #[test_case(4 ; "small burst")]
    #[test_case(16 ; "large burst")]
    fn test_burst_stats(callers: u64) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        rt.block_on(async {
            let coalescer = Coalescer::new();
            let counter = Counter::default();
            let calls = (0..callers).map(|_| coalescer.run_delayed(DELAY, counter.op(Duration::ZERO)));
            let results = join_all(calls).await;

            assert!(results.iter().all(|r| *r == Ok(1)));
            assert_eq!(
                coalescer.stats(),
                CoalescerStats {
                    executions: 1,
                    coalesced: callers - 1
                }
            );
        });
    }
}
