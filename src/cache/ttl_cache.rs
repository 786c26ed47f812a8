//! Time- and size-bounded map with passive expiry and LRU eviction.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

/// Expiry and capacity rules for a [`TtlCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// How long an entry stays valid after it is stored.
    pub ttl: Duration,
    /// Maximum number of live entries (at least 1).
    pub max_entries: usize,
}

impl CachePolicy {
    /// Creates a policy; `max_entries` of zero is raised to one.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
        }
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
    last_used: u64,
}

/// Lookaside cache.
///
/// Entries are checked for expiry when they are read; a full cache first
/// drops expired entries and then the least recently used one.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    policy: CachePolicy,
    entries: HashMap<K, Entry<V>>,
    tick: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Creates an empty cache governed by `policy`.
    #[must_use]
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
            tick: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick = self.tick.wrapping_add(1);
        self.tick
    }

    /// Returns a clone of the live value for `key`, dropping it if expired.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = Instant::now();
        let tick = self.next_tick();
        match self.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_used = tick;
                Some(entry.value.clone())
            }
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `value` under `key` for one TTL, evicting if full.
    pub fn put(&mut self, key: K, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.policy.max_entries {
            self.purge_expired();
            if self.entries.len() >= self.policy.max_entries {
                self.evict_least_recent();
            }
        }
        let tick = self.next_tick();
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.policy.ttl,
                last_used: tick,
            },
        );
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Keeps only the entries whose key satisfies `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        self.entries.retain(|key, _| keep(key));
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included until purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the policy this cache was built with.
    #[must_use]
    pub const fn policy(&self) -> CachePolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_secs: u64, max: usize) -> TtlCache<u32, &'static str> {
        TtlCache::new(CachePolicy::new(Duration::from_secs(ttl_secs), max))
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_on_access() {
        let mut cache = cache(60, 10);
        cache.put(1, "a");
        assert_eq!(cache.get(&1), Some("a"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_evicts_least_recently_used() {
        let mut cache = cache(600, 2);
        cache.put(1, "a");
        cache.put(2, "b");
        assert_eq!(cache.get(&1), Some("a"));

        cache.put(3, "c");
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some("a"));
        assert_eq!(cache.get(&3), Some("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_purged_before_eviction() {
        let mut cache = cache(10, 2);
        cache.put(1, "old");
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.put(2, "recent");
        tokio::time::advance(Duration::from_secs(6)).await;

        cache.put(3, "new");
        assert_eq!(cache.get(&2), Some("recent"));
        assert_eq!(cache.get(&3), Some("new"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn overwrite_does_not_evict() {
        let mut cache = cache(600, 1);
        cache.put(1, "a");
        cache.put(1, "b");
        assert_eq!(cache.get(&1), Some("b"));
        assert_eq!(cache.policy().max_entries, 1);
    }

    #[test]
    fn retain_and_remove() {
        let mut cache = cache(600, 10);
        for key in 0..6 {
            cache.put(key, "x");
        }
        cache.retain(|k| k % 2 == 0);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.remove(&4), Some("x"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
