//! Per-connection subscription manager.
//!
//! Tracks which datasets a WebSocket client is subscribed to and provides
//! server-side event filtering. A pattern is an exact dataset key, `"*"`,
//! or a prefix ending in `*`.

use std::collections::BTreeSet;

/// Manages the set of dataset subscriptions for a single WebSocket
/// connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Exact dataset keys.
    exact: BTreeSet<String>,
    /// Prefixes of `prefix*` patterns, without the `*`.
    prefixes: BTreeSet<String>,
    /// Whether the client subscribes to everything (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds patterns to the subscription set.
    pub fn subscribe<S: AsRef<str>>(&mut self, patterns: &[S]) {
        for pattern in patterns {
            match pattern.as_ref().trim() {
                "" => {}
                "*" => self.subscribe_all = true,
                p => match p.strip_suffix('*') {
                    Some(prefix) => {
                        self.prefixes.insert(prefix.to_string());
                    }
                    None => {
                        self.exact.insert(p.to_string());
                    }
                },
            }
        }
    }

    /// Removes patterns from the subscription set.
    pub fn unsubscribe<S: AsRef<str>>(&mut self, patterns: &[S]) {
        for pattern in patterns {
            match pattern.as_ref().trim() {
                "*" => self.subscribe_all = false,
                p => match p.strip_suffix('*') {
                    Some(prefix) => {
                        self.prefixes.remove(prefix);
                    }
                    None => {
                        self.exact.remove(p);
                    }
                },
            }
        }
    }

    /// Returns `true` if events of `dataset` should be forwarded.
    #[must_use]
    pub fn matches(&self, dataset: &str) -> bool {
        self.subscribe_all
            || self.exact.contains(dataset)
            || self.prefixes.iter().any(|p| dataset.starts_with(p.as_str()))
    }

    /// Returns the explicit patterns, prefixes rendered with their `*`.
    #[must_use]
    pub fn patterns(&self) -> Vec<String> {
        self.exact
            .iter()
            .cloned()
            .chain(self.prefixes.iter().map(|p| format!("{p}*")))
            .collect()
    }

    /// Returns the number of explicit patterns.
    #[must_use]
    pub fn count(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches("market_order"));
    }

    #[test]
    fn exact_and_prefix_patterns() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&["orders:jita", "history:*"]);
        assert!(mgr.matches("orders:jita"));
        assert!(!mgr.matches("orders:amarr"));
        assert!(mgr.matches("history:34:10000002"));
        assert!(!mgr.matches("history_batch:10000002"));
        assert!(!mgr.matches("market_order"));
        assert_eq!(mgr.count(), 2);
    }

    #[test]
    fn wildcard_matches_everything_until_removed() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&["*"]);
        assert!(mgr.matches("market_order"));
        assert!(mgr.is_subscribed_all());
        mgr.unsubscribe(&["*"]);
        assert!(!mgr.matches("market_order"));
    }

    #[test]
    fn unsubscribe_removes_pattern() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&["market_order", "orders:*"]);
        mgr.unsubscribe(&["orders:*"]);
        assert!(!mgr.matches("orders:jita"));
        assert_eq!(mgr.patterns(), vec!["market_order".to_string()]);
    }
}
