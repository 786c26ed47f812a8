//! Events describing refresh progress and cache materialization.
//!
//! Every refresh cycle emits [`SyncEvent`]s through the [`super::EventBus`].
//! Events are broadcast to WebSocket subscribers so that clients can show
//! liveness while a large batch is still in flight.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle and progress event for one dataset refresh.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// The dataset was found stale (or forced) and a fetch cycle begins.
    RefreshStarted {
        /// Dataset key or batch label.
        dataset: String,
        /// Start timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The dataset was still fresh; served from the snapshot.
    RefreshSkipped {
        /// Dataset key.
        dataset: String,
        /// Decision timestamp.
        timestamp: DateTime<Utc>,
    },

    /// One page (or one batch item) finished, successfully or not.
    ItemFetched {
        /// Dataset key or batch label.
        dataset: String,
        /// Page index or type id that finished.
        item: String,
        /// Whether the fetch succeeded.
        succeeded: bool,
        /// Items finished so far, this one included.
        completed: usize,
        /// Items in the batch.
        total: usize,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The snapshot table was rebuilt from the authoritative table.
    CacheMaterialized {
        /// Dataset that triggered the rebuild.
        dataset: String,
        /// Snapshot table name.
        cache: String,
        /// Rows copied.
        rows: u64,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The refresh finished and its marker was advanced.
    RefreshCompleted {
        /// Dataset key or batch label.
        dataset: String,
        /// Records written to the authoritative store.
        records: u64,
        /// Pages or items that failed and were skipped.
        failures: usize,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The refresh aborted; the marker was left untouched.
    RefreshFailed {
        /// Dataset key or batch label.
        dataset: String,
        /// Failure description.
        message: String,
        /// Failure timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl SyncEvent {
    /// Returns the dataset this event belongs to.
    #[must_use]
    pub fn dataset(&self) -> &str {
        match self {
            Self::RefreshStarted { dataset, .. }
            | Self::RefreshSkipped { dataset, .. }
            | Self::ItemFetched { dataset, .. }
            | Self::CacheMaterialized { dataset, .. }
            | Self::RefreshCompleted { dataset, .. }
            | Self::RefreshFailed { dataset, .. } => dataset,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::RefreshStarted { .. } => "refresh_started",
            Self::RefreshSkipped { .. } => "refresh_skipped",
            Self::ItemFetched { .. } => "item_fetched",
            Self::CacheMaterialized { .. } => "cache_materialized",
            Self::RefreshCompleted { .. } => "refresh_completed",
            Self::RefreshFailed { .. } => "refresh_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_fetched_serializes_with_tag() {
        let event = SyncEvent::ItemFetched {
            dataset: "orders:jita".to_string(),
            item: "12".to_string(),
            succeeded: false,
            completed: 3,
            total: 40,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"event_type\":\"item_fetched\""));
        assert!(json.contains("orders:jita"));
    }

    #[test]
    fn dataset_accessor() {
        let event = SyncEvent::RefreshSkipped {
            dataset: "market_order".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.dataset(), "market_order");
        assert_eq!(event.event_type_str(), "refresh_skipped");
    }
}
