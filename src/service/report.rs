//! Results returned by refresh and read operations.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{HistoryRecord, HistoryStats, VenueSummary};

/// What one venue ingest wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct IngestReport {
    /// Venue name.
    pub venue: String,
    /// Pages discovered by the probe.
    pub pages: u32,
    /// Requests spent discovering the page count.
    pub probe_requests: u32,
    /// Pages that failed and were skipped.
    pub failed_pages: Vec<u32>,
    /// Orders written to the authoritative table.
    pub inserted: u64,
}

/// Snapshot counts of one venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct VenueStatus {
    /// Venue name.
    pub venue: String,
    /// Venue location id.
    pub location_id: i64,
    /// Order counts in the snapshot.
    pub summary: VenueSummary,
    /// Last successful refresh of the venue.
    pub last_refresh: Option<DateTime<Utc>>,
}

/// Outcome of a [`crate::service::MarketService::refresh`] call.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RefreshReport {
    /// Dataset key that was requested.
    pub dataset: String,
    /// `false` when the dataset was still fresh and nothing was fetched.
    pub refreshed: bool,
    /// Per-venue ingest details (order datasets only).
    pub ingested: Vec<IngestReport>,
    /// Snapshot counts per venue (order datasets only).
    pub venues: Vec<VenueStatus>,
    /// Records written to the authoritative store.
    pub records: u64,
    /// Pages or items that failed and were skipped.
    pub failed_items: usize,
    /// Venue- or item-level errors that did not abort the refresh.
    pub errors: Vec<String>,
    /// Human-readable summary.
    pub summary: String,
}

/// Outcome of a staleness-filtered history batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct HistoryBatchReport {
    /// Region the batch targeted.
    pub region_id: i32,
    /// Distinct type ids requested.
    pub requested: usize,
    /// Type ids that were stale and therefore fetched.
    pub stale: Vec<i32>,
    /// Type ids ingested and marked fresh.
    pub ingested: Vec<i32>,
    /// Type ids whose fetch failed.
    pub failed: Vec<i32>,
    /// History rows actually inserted.
    pub inserted: u64,
}

/// History of one type, newest or oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HistorySeries {
    /// Item type id.
    pub type_id: i32,
    /// Region id.
    pub region_id: i32,
    /// Daily rows.
    pub records: Vec<HistoryRecord>,
}

/// Window statistics of one type in one region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct RegionHistoryStats {
    /// Item type id.
    pub type_id: i32,
    /// Region id.
    pub region_id: i32,
    /// Week, month and year aggregates.
    pub stats: HistoryStats,
}

/// Renders the per-venue order counts shown to chat and HTTP callers.
///
/// ```text
/// jita:
///   total orders: 120 (buy: 50, sell: 70, types: 12)
/// ```
#[must_use]
pub fn render_summary(venues: &[VenueStatus]) -> String {
    let mut out = String::new();
    for status in venues {
        let s = status.summary;
        let _ = writeln!(
            out,
            "{}:\n  total orders: {} (buy: {}, sell: {}, types: {})",
            status.venue, s.total, s.buy, s.sell, s.distinct_types
        );
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_every_venue() {
        let venues = vec![
            VenueStatus {
                venue: "jita".to_string(),
                location_id: 60003760,
                summary: VenueSummary {
                    total: 120,
                    buy: 50,
                    sell: 70,
                    distinct_types: 12,
                },
                last_refresh: None,
            },
            VenueStatus {
                venue: "frt".to_string(),
                location_id: 7,
                summary: VenueSummary::default(),
                last_refresh: None,
            },
        ];
        assert_eq!(
            render_summary(&venues),
            "jita:\n  total orders: 120 (buy: 50, sell: 70, types: 12)\n\
             frt:\n  total orders: 0 (buy: 0, sell: 0, types: 0)"
        );
    }
}
