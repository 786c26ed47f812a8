//! Per-dataset freshness tracking.
//!
//! [`RefreshScheduler`] answers "is this dataset stale?" from the refresh
//! marker stored for its key and advances that marker after a successful
//! refresh. Checks are read-then-decide; callers serialize same-key
//! refreshes with a [`crate::domain::KeyedLease`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::domain::DatasetKey;
use crate::error::SyncError;
use crate::persistence::MarketStore;

/// Minimum age before a dataset is due again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    /// Wall-clock minutes since the last refresh.
    Minutes(u32),
    /// UTC hour boundaries crossed since the last refresh.
    Hours(u32),
    /// Wall-clock days since the last refresh.
    Days(u32),
}

impl Interval {
    /// Returns `true` if a dataset refreshed at `last` is due at `now`.
    #[must_use]
    pub fn elapsed(self, last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Self::Minutes(n) => now - last > Duration::minutes(i64::from(n)),
            Self::Days(n) => now - last > Duration::days(i64::from(n)),
            Self::Hours(n) => {
                let hour = |t: DateTime<Utc>| t.timestamp().div_euclid(3_600);
                hour(now) - hour(last) >= i64::from(n)
            }
        }
    }
}

/// Freshness oracle backed by the refresh markers of a [`MarketStore`].
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    store: Arc<dyn MarketStore>,
}

impl RefreshScheduler {
    /// Creates a scheduler over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Self { store }
    }

    /// Returns `true` if `key` has never been refreshed or its interval has
    /// elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if the marker cannot be read.
    pub async fn out_of_interval(
        &self,
        key: &DatasetKey,
        interval: Interval,
    ) -> Result<bool, SyncError> {
        self.out_of_interval_at(key, interval, Utc::now()).await
    }

    /// [`Self::out_of_interval`] against an explicit clock value.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if the marker cannot be read.
    pub async fn out_of_interval_at(
        &self,
        key: &DatasetKey,
        interval: Interval,
        now: DateTime<Utc>,
    ) -> Result<bool, SyncError> {
        let last = self.store.refresh_marker(&key.to_string()).await?;
        Ok(last.is_none_or(|last| interval.elapsed(last, now)))
    }

    /// Records a successful refresh of `key` now.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if the marker cannot be written.
    pub async fn mark_refreshed(&self, key: &DatasetKey) -> Result<(), SyncError> {
        self.mark_refreshed_at(key, Utc::now()).await
    }

    /// Records a successful refresh of `key` at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if the marker cannot be written.
    pub async fn mark_refreshed_at(
        &self,
        key: &DatasetKey,
        at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        self.store.upsert_refresh_marker(&key.to_string(), at).await
    }

    /// Returns the last refresh of `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if the marker cannot be read.
    pub async fn last_refresh(&self, key: &DatasetKey) -> Result<Option<DateTime<Utc>>, SyncError> {
        self.store.refresh_marker(&key.to_string()).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        let Some(t) = Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single() else {
            panic!("valid timestamp");
        };
        t
    }

    fn scheduler() -> RefreshScheduler {
        RefreshScheduler::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn stale_until_marked_then_fresh_until_interval_elapses() {
        let scheduler = scheduler();
        let key = DatasetKey::MarketOrders;
        let t0 = at(2024, 5, 1, 12, 0);
        let interval = Interval::Minutes(20);

        assert!(matches!(scheduler.out_of_interval_at(&key, interval, t0).await, Ok(true)));
        let Ok(()) = scheduler.mark_refreshed_at(&key, t0).await else {
            panic!("mark should succeed");
        };
        assert!(matches!(scheduler.out_of_interval_at(&key, interval, t0).await, Ok(false)));
        assert!(matches!(
            scheduler.out_of_interval_at(&key, interval, at(2024, 5, 1, 12, 20)).await,
            Ok(false)
        ));
        assert!(matches!(
            scheduler.out_of_interval_at(&key, interval, at(2024, 5, 1, 12, 21)).await,
            Ok(true)
        ));
    }

    #[tokio::test]
    async fn mark_is_idempotent() {
        let scheduler = scheduler();
        let key = DatasetKey::history(34, 10000002);
        let t0 = at(2024, 5, 1, 0, 0);
        for _ in 0..3 {
            let Ok(()) = scheduler.mark_refreshed_at(&key, t0).await else {
                panic!("mark should succeed");
            };
        }
        assert!(matches!(scheduler.last_refresh(&key).await, Ok(Some(t)) if t == t0));
    }

    #[test]
    fn day_interval_is_wall_clock() {
        let last = at(2024, 5, 1, 23, 0);
        assert!(!Interval::Days(1).elapsed(last, at(2024, 5, 2, 1, 0)));
        assert!(!Interval::Days(1).elapsed(last, at(2024, 5, 2, 23, 0)));
        assert!(Interval::Days(1).elapsed(last, at(2024, 5, 2, 23, 1)));
    }

    #[test]
    fn hour_interval_counts_boundaries_across_midnight() {
        let last = at(2024, 5, 1, 23, 59);
        assert!(Interval::Hours(1).elapsed(last, at(2024, 5, 2, 0, 0)));
        assert!(!Interval::Hours(2).elapsed(last, at(2024, 5, 2, 0, 59)));
        assert!(Interval::Hours(2).elapsed(last, at(2024, 5, 2, 1, 0)));
        assert!(!Interval::Hours(1).elapsed(at(2024, 5, 2, 1, 0), at(2024, 5, 2, 1, 59)));
    }
}
