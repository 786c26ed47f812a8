//! In-process lookaside cache for the hottest reads.
//!
//! [`HotPathCache`] keeps best quotes per `(location, type)` and history
//! series per `(type, region)` in [`TtlCache`]s guarded by
//! [`std::sync::Mutex`]. Locks are only held for map operations, never
//! across an `.await`; on a miss the value is computed outside the lock and
//! stored afterwards.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use utoipa::ToSchema;

use super::{CachePolicy, TtlCache};
use crate::domain::{HistoryRecord, Quote};
use crate::error::SyncError;

/// Hit/miss counters and current sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct CacheStats {
    /// Lookups answered from memory.
    pub hits: u64,
    /// Lookups that had to be computed.
    pub misses: u64,
    /// Quote entries held.
    pub quote_entries: usize,
    /// History entries held.
    pub history_entries: usize,
}

/// Quote and history lookaside caches.
#[derive(Debug)]
pub struct HotPathCache {
    quotes: Mutex<TtlCache<(i64, i32), Quote>>,
    history: Mutex<TtlCache<(i32, i32), Arc<Vec<HistoryRecord>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

fn lock<K, V>(cache: &Mutex<TtlCache<K, V>>) -> MutexGuard<'_, TtlCache<K, V>> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HotPathCache {
    /// Creates the caches with their own expiry policies.
    #[must_use]
    pub fn new(quote_policy: CachePolicy, history_policy: CachePolicy) -> Self {
        Self {
            quotes: Mutex::new(TtlCache::new(quote_policy)),
            history: Mutex::new(TtlCache::new(history_policy)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    async fn get_or_try_insert<K, V, F, Fut>(
        &self,
        cache: &Mutex<TtlCache<K, V>>,
        key: K,
        compute: F,
    ) -> Result<V, SyncError>
    where
        K: Eq + Hash + Clone,
        V: Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, SyncError>>,
    {
        let cached = lock(cache).get(&key);
        if let Some(value) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute().await?;
        lock(cache).put(key, value.clone());
        Ok(value)
    }

    /// Returns the cached quote for `(location_id, type_id)` or computes and
    /// stores it.
    ///
    /// # Errors
    ///
    /// Propagates the error of `compute`; nothing is cached in that case.
    pub async fn quote<F, Fut>(
        &self,
        location_id: i64,
        type_id: i32,
        compute: F,
    ) -> Result<Quote, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Quote, SyncError>>,
    {
        self.get_or_try_insert(&self.quotes, (location_id, type_id), compute)
            .await
    }

    /// Returns the cached history series (newest first) for
    /// `(type_id, region_id)` or computes and stores it.
    ///
    /// # Errors
    ///
    /// Propagates the error of `compute`; nothing is cached in that case.
    pub async fn history<F, Fut>(
        &self,
        type_id: i32,
        region_id: i32,
        compute: F,
    ) -> Result<Arc<Vec<HistoryRecord>>, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Vec<HistoryRecord>>, SyncError>>,
    {
        self.get_or_try_insert(&self.history, (type_id, region_id), compute)
            .await
    }

    /// Drops cached quotes of one venue.
    pub fn invalidate_quotes(&self, location_id: i64) {
        lock(&self.quotes).retain(|(location, _)| *location != location_id);
    }

    /// Drops every cached quote.
    pub fn invalidate_all_quotes(&self) {
        lock(&self.quotes).clear();
    }

    /// Drops the cached series of one `(type_id, region_id)`.
    pub fn invalidate_history(&self, type_id: i32, region_id: i32) {
        lock(&self.history).remove(&(type_id, region_id));
    }

    /// Returns counters and sizes.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            quote_entries: lock(&self.quotes).len(),
            history_entries: lock(&self.history).len(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn hot_cache() -> HotPathCache {
        HotPathCache::new(
            CachePolicy::new(Duration::from_secs(600), 500),
            CachePolicy::new(Duration::from_secs(36_000), 500),
        )
    }

    #[tokio::test]
    async fn hit_skips_compute() {
        let cache = hot_cache();
        let calls = &AtomicUsize::new(0);
        for _ in 0..3 {
            let Ok(quote) = cache
                .quote(7, 34, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Quote::from_extremes(34, 7, Some(4.0), Some(5.0)))
                })
                .await
            else {
                panic!("quote should compute");
            };
            assert_eq!(quote.best_ask, 5.0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.quote_entries), (2, 1, 1));
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = hot_cache();
        let failed = cache
            .history(34, 1, || async { Err(SyncError::Persistence("down".to_string())) })
            .await;
        assert!(failed.is_err());
        assert_eq!(cache.stats().history_entries, 0);
    }

    #[tokio::test]
    async fn invalidation_forces_recompute() {
        let cache = hot_cache();
        let calls = &AtomicUsize::new(0);
        let compute = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Quote::from_extremes(34, 7, None, None))
        };
        let _ = cache.quote(7, 34, compute).await;
        let _ = cache.quote(8, 34, compute).await;
        cache.invalidate_quotes(7);
        assert_eq!(cache.stats().quote_entries, 1);
        let _ = cache.quote(7, 34, compute).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let _ = cache.history(34, 1, || async { Ok(Arc::new(Vec::new())) }).await;
        cache.invalidate_history(34, 1);
        assert_eq!(cache.stats().history_entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_quote_is_recomputed() {
        let cache = hot_cache();
        let calls = &AtomicUsize::new(0);
        let compute = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Quote::from_extremes(34, 7, None, Some(1.0)))
        };
        let _ = cache.quote(7, 34, compute).await;
        tokio::time::advance(Duration::from_secs(601)).await;
        let _ = cache.quote(7, 34, compute).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
