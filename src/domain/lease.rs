//! Per-dataset mutual exclusion for refresh cycles.
//!
//! [`KeyedLease`] stores one [`tokio::sync::Mutex`] per dataset key inside
//! an outer map. Holding the returned [`LeaseGuard`] grants exclusive right
//! to refresh that dataset; concurrent refreshes of *different* datasets
//! proceed in parallel. Dropping the guard (including on an error path or
//! task cancellation) releases the lease.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::DatasetKey;

/// Entries above this count trigger pruning of unused locks.
const PRUNE_THRESHOLD: usize = 1024;

/// Exclusive right to refresh one dataset, released on drop.
#[derive(Debug)]
pub struct LeaseGuard {
    key: DatasetKey,
    _guard: OwnedMutexGuard<()>,
}

impl LeaseGuard {
    /// Returns the dataset this lease covers.
    #[must_use]
    pub const fn key(&self) -> &DatasetKey {
        &self.key
    }
}

/// Map of per-dataset refresh locks.
///
/// Leases are not reentrant: acquiring a key twice from the same task
/// deadlocks.
#[derive(Debug, Default)]
pub struct KeyedLease {
    locks: Mutex<HashMap<DatasetKey, Arc<Mutex<()>>>>,
}

impl KeyedLease {
    /// Creates an empty lease map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, key: &DatasetKey) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock().await;
        if map.len() > PRUNE_THRESHOLD {
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(map.entry(key.clone()).or_default())
    }

    /// Waits until the lease for `key` is free and takes it.
    pub async fn acquire(&self, key: &DatasetKey) -> LeaseGuard {
        let slot = self.slot(key).await;
        LeaseGuard {
            key: key.clone(),
            _guard: slot.lock_owned().await,
        }
    }

    /// Takes the lease for `key` if nobody holds it.
    pub async fn try_acquire(&self, key: &DatasetKey) -> Option<LeaseGuard> {
        let slot = self.slot(key).await;
        slot.try_lock_owned().ok().map(|guard| LeaseGuard {
            key: key.clone(),
            _guard: guard,
        })
    }

    /// Returns `true` while some task holds the lease for `key`.
    pub async fn is_held(&self, key: &DatasetKey) -> bool {
        let map = self.locks.lock().await;
        map.get(key).is_some_and(|lock| lock.try_lock().is_err())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_acquire_waits_for_release() {
        let leases = Arc::new(KeyedLease::new());
        let key = DatasetKey::MarketOrders;

        let guard = leases.acquire(&key).await;
        assert!(leases.is_held(&key).await);
        assert!(leases.try_acquire(&key).await.is_none());

        let waiter = {
            let leases = Arc::clone(&leases);
            let key = key.clone();
            tokio::spawn(async move { leases.acquire(&key).await.key().clone() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        let Ok(acquired) = waiter.await else {
            panic!("waiter should complete");
        };
        assert_eq!(acquired, key);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let leases = KeyedLease::new();
        let _a = leases.acquire(&DatasetKey::venue("jita")).await;
        let b = leases.try_acquire(&DatasetKey::venue("amarr")).await;
        assert!(b.is_some());
    }

    #[tokio::test]
    async fn lease_released_on_drop() {
        let leases = KeyedLease::new();
        let key = DatasetKey::history(34, 1);
        drop(leases.acquire(&key).await);
        assert!(!leases.is_held(&key).await);
    }

    #[tokio::test]
    async fn waiter_is_woken_by_release() {
        let leases = KeyedLease::new();
        let key = DatasetKey::venue("jita");
        let guard = leases.acquire(&key).await;

        let mut waiter = tokio_test::task::spawn(leases.acquire(&key));
        tokio_test::assert_pending!(waiter.poll());

        drop(guard);
        assert!(waiter.is_woken());
        let lease = tokio_test::assert_ready!(waiter.poll());
        assert_eq!(lease.key(), &key);
    }
}
