//! Bounded, rate-limited concurrent fetching with per-item failure isolation.
//!
//! [`FetchOrchestrator`] runs one task per key in a [`JoinSet`]. Each task
//! takes a concurrency permit, then a rate-limiter token, then performs its
//! fetch under a per-request timeout. A failed item is logged with its cause
//! chain and reported in the [`BatchOutcome`]; it never cancels its
//! siblings. An optional batch deadline aborts whatever is still running.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::RateLimiter;
use crate::error::FetchError;

/// Deepest `source()` level recorded for a failure.
const MAX_CAUSE_DEPTH: usize = 5;

/// One finished item, reported as soon as its task completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// The finished key (page index or type id).
    pub item: String,
    /// Whether the fetch succeeded.
    pub succeeded: bool,
    /// Items finished so far, this one included.
    pub completed: usize,
    /// Items in the batch.
    pub total: usize,
}

/// A failed item with its structured cause chain.
#[derive(Debug)]
pub struct FetchFailure<K> {
    /// Key that failed.
    pub key: K,
    /// Top-level error.
    pub error: FetchError,
    /// Messages of the chained `source()` errors, outermost first.
    pub causes: Vec<String>,
}

/// Aggregated result of a batch.
#[derive(Debug)]
pub struct BatchOutcome<K, T> {
    /// Successful items, in completion order.
    pub successes: Vec<(K, T)>,
    /// Failed items, in completion order.
    pub failures: Vec<FetchFailure<K>>,
}

impl<K, T> BatchOutcome<K, T> {
    /// Returns the number of items in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    /// Returns `true` for an empty batch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs fetch batches against a shared limiter and concurrency cap.
#[derive(Debug, Clone)]
pub struct FetchOrchestrator {
    limiter: Arc<RateLimiter>,
    semaphore: Arc<Semaphore>,
    request_timeout: Duration,
    batch_deadline: Option<Duration>,
}

impl FetchOrchestrator {
    /// Creates an orchestrator allowing `max_concurrent` in-flight fetches.
    #[must_use]
    pub fn new(
        limiter: Arc<RateLimiter>,
        max_concurrent: usize,
        request_timeout: Duration,
        batch_deadline: Option<Duration>,
    ) -> Self {
        Self {
            limiter,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            request_timeout,
            batch_deadline,
        }
    }

    /// Returns the shared rate limiter.
    #[must_use]
    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the batch deadline, if any.
    #[must_use]
    pub fn batch_deadline(&self) -> Option<Duration> {
        self.batch_deadline
    }

    /// Fetches pages `1..=pages`.
    pub async fn fetch_pages<T, F, Fut, P>(
        &self,
        pages: u32,
        fetch: F,
        progress: P,
    ) -> BatchOutcome<u32, T>
    where
        T: Send + 'static,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
        P: FnMut(Progress),
    {
        self.run(1..=pages, fetch, progress).await
    }

    /// Fetches every key concurrently and aggregates the outcome.
    ///
    /// `progress` is called once per finished item, success or failure.
    pub async fn run<K, T, F, Fut, P>(
        &self,
        keys: impl IntoIterator<Item = K>,
        mut fetch: F,
        mut progress: P,
    ) -> BatchOutcome<K, T>
    where
        K: Clone + Display,
        T: Send + 'static,
        F: FnMut(K) -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
        P: FnMut(Progress),
    {
        let mut set = JoinSet::new();
        let mut pending = HashMap::new();
        for key in keys {
            let semaphore = Arc::clone(&self.semaphore);
            let limiter = Arc::clone(&self.limiter);
            let timeout = self.request_timeout;
            let request = fetch(key.clone());
            let handle = set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| FetchError::Aborted(e.to_string()))?;
                limiter.acquire().await;
                tokio::time::timeout(timeout, request)
                    .await
                    .map_err(|_| FetchError::Timeout(timeout))?
            });
            pending.insert(handle.id(), key);
        }

        let total = pending.len();
        let deadline = self.batch_deadline.map(|d| Instant::now() + d);
        let mut expired = false;
        let mut outcome = BatchOutcome {
            successes: Vec::with_capacity(total),
            failures: Vec::new(),
        };

        loop {
            let joined = match deadline {
                Some(at) if !expired => {
                    if let Ok(joined) = tokio::time::timeout_at(at, set.join_next_with_id()).await {
                        joined
                    } else {
                        tracing::warn!(
                            remaining = set.len(),
                            total,
                            "batch deadline exceeded, aborting remaining fetches"
                        );
                        set.abort_all();
                        expired = true;
                        continue;
                    }
                }
                _ => set.join_next_with_id().await,
            };
            let Some(joined) = joined else {
                break;
            };

            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(err) => {
                    let error = if err.is_cancelled() && expired {
                        FetchError::Deadline
                    } else {
                        FetchError::Aborted(err.to_string())
                    };
                    (err.id(), Err(error))
                }
            };
            let Some(key) = pending.remove(&id) else {
                continue;
            };

            let completed = outcome.len() + 1;
            progress(Progress {
                item: key.to_string(),
                succeeded: result.is_ok(),
                completed,
                total,
            });
            match result {
                Ok(value) => outcome.successes.push((key, value)),
                Err(error) => {
                    let causes = cause_chain(&error);
                    tracing::warn!(
                        item = %key,
                        kind = error.kind(),
                        error = %error,
                        causes = ?causes,
                        "fetch failed, skipping item"
                    );
                    outcome.failures.push(FetchFailure { key, error, causes });
                }
            }
        }

        outcome
    }
}

/// Collects the messages of `error`'s `source()` chain, at most
/// [`MAX_CAUSE_DEPTH`] levels deep.
fn cause_chain(error: &(dyn std::error::Error + 'static)) -> Vec<String> {
    std::iter::successors(error.source(), |e| e.source())
        .take(MAX_CAUSE_DEPTH)
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn orchestrator(max_concurrent: usize, deadline: Option<Duration>) -> FetchOrchestrator {
        let Ok(limiter) = RateLimiter::new(60_000, 10_000) else {
            panic!("valid limiter");
        };
        FetchOrchestrator::new(
            Arc::new(limiter),
            max_concurrent,
            Duration::from_secs(5),
            deadline,
        )
    }

    #[derive(Debug, thiserror::Error)]
    #[error("level {0}")]
    struct Nested(usize, #[source] Option<Box<Nested>>);

    fn nested(depth: usize) -> Nested {
        (1..depth).fold(Nested(depth, None), |inner, level| {
            Nested(depth - level, Some(Box::new(inner)))
        })
    }

    #[tokio::test]
    async fn partial_failures_do_not_abort_batch() {
        let orch = orchestrator(4, None);
        let mut progress = Vec::new();
        let outcome = orch
            .fetch_pages(
                10,
                |page| async move {
                    if page % 3 == 0 {
                        Err(FetchError::Status {
                            status: 503,
                            url: format!("page {page}"),
                        })
                    } else {
                        Ok(page * 10)
                    }
                },
                |p| progress.push(p),
            )
            .await;

        assert_eq!(outcome.successes.len(), 7);
        assert_eq!(outcome.failures.len(), 3);
        let mut failed: Vec<u32> = outcome.failures.iter().map(|f| f.key).collect();
        failed.sort_unstable();
        assert_eq!(failed, vec![3, 6, 9]);

        assert_eq!(progress.len(), 10);
        assert_eq!(progress.last().map(|p| p.completed), Some(10));
        assert!(progress.iter().all(|p| p.total == 10));
    }

    #[tokio::test]
    async fn in_flight_never_exceeds_cap() {
        let orch = orchestrator(3, None);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let outcome = orch
            .run(
                0..20u32,
                |_| {
                    let in_flight = Arc::clone(&in_flight);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                |_| {},
            )
            .await;
        assert_eq!(outcome.successes.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_requests_time_out_individually() {
        let orch = orchestrator(10, None);
        let outcome = orch
            .run(
                [1u64, 60],
                |secs| async move {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    Ok(secs)
                },
                |_| {},
            )
            .await;
        assert_eq!(outcome.successes.len(), 1);
        assert!(matches!(
            outcome.failures.first(),
            Some(FetchFailure { key: 60, error: FetchError::Timeout(_), .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_remaining_tasks() {
        let Ok(limiter) = RateLimiter::new(60_000, 10_000) else {
            panic!("valid limiter");
        };
        let orch = FetchOrchestrator::new(
            Arc::new(limiter),
            10,
            Duration::from_secs(600),
            Some(Duration::from_secs(30)),
        );
        let outcome = orch
            .run(
                [1u64, 2, 120, 300],
                |secs| async move {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    Ok(secs)
                },
                |_| {},
            )
            .await;
        assert_eq!(outcome.successes.len(), 2);
        assert_eq!(outcome.failures.len(), 2);
        assert!(
            outcome
                .failures
                .iter()
                .all(|f| matches!(f.error, FetchError::Deadline))
        );
    }

    #[test]
    fn cause_chain_is_capped() {
        let error = FetchError::Other {
            context: "fetching history".to_string(),
            source: Box::new(nested(8)),
        };
        let causes = cause_chain(&error);
        assert_eq!(causes.len(), MAX_CAUSE_DEPTH);
        assert_eq!(causes.first().map(String::as_str), Some("level 1"));
    }

    #[tokio::test]
    async fn empty_batch_completes_immediately() {
        let orch = orchestrator(2, Some(Duration::from_secs(1)));
        let outcome = orch
            .fetch_pages(0, |_| async { Ok(()) }, |_| panic!("no progress expected"))
            .await;
        assert!(outcome.is_empty());
    }
}
