//! Daily trading history and the window statistics computed from it.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One day's aggregate trading stats for a `(region, type)` pair.
///
/// Unique per `(region_id, type_id, date)`; never updated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistoryRecord {
    /// Region id.
    pub region_id: i32,
    /// Item type id.
    pub type_id: i32,
    /// Trading day.
    pub date: NaiveDate,
    /// Volume-weighted average price.
    pub average: f64,
    /// Highest traded price.
    pub highest: f64,
    /// Lowest traded price.
    pub lowest: f64,
    /// Units traded.
    pub volume: i64,
    /// Number of orders filled.
    pub order_count: i64,
}

/// Requested date ordering of a history series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HistoryOrder {
    /// Oldest day first.
    Asc,
    /// Newest day first.
    #[default]
    Desc,
}

/// Aggregates over one trailing window of days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
pub struct WindowStats {
    /// ISK flow: sum of `average * volume`.
    pub flow: f64,
    /// Mean of the daily highest prices.
    pub highest_average: f64,
    /// Mean of the daily lowest prices.
    pub lowest_average: f64,
    /// Total units traded.
    pub volume: i64,
    /// Days that contributed.
    pub days: u32,
}

/// Week, month and year statistics for one type in one region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
pub struct HistoryStats {
    /// Last 9 days.
    pub week: WindowStats,
    /// Last 32 days.
    pub month: WindowStats,
    /// Last 366 days.
    pub year: WindowStats,
}

/// Length of the longest statistics window, in days.
pub const YEAR_WINDOW_DAYS: u64 = 366;
const MONTH_WINDOW_DAYS: u64 = 32;
const WEEK_WINDOW_DAYS: u64 = 9;

impl HistoryStats {
    /// Computes all windows relative to `today` (a row belongs to a window
    /// when its date is on or after `today - window`).
    #[must_use]
    pub fn compute(rows: &[HistoryRecord], today: NaiveDate) -> Self {
        Self {
            week: window(rows, today, WEEK_WINDOW_DAYS),
            month: window(rows, today, MONTH_WINDOW_DAYS),
            year: window(rows, today, YEAR_WINDOW_DAYS),
        }
    }
}

fn window(rows: &[HistoryRecord], today: NaiveDate, days: u64) -> WindowStats {
    let cutoff = today.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);
    let mut stats = WindowStats::default();
    let (mut highest_sum, mut lowest_sum) = (0.0, 0.0);
    for row in rows.iter().filter(|r| r.date >= cutoff) {
        #[allow(clippy::cast_precision_loss)]
        let volume = row.volume as f64;
        stats.flow += row.average * volume;
        stats.volume = stats.volume.saturating_add(row.volume);
        highest_sum += row.highest;
        lowest_sum += row.lowest;
        stats.days += 1;
    }
    if stats.days > 0 {
        stats.highest_average = highest_sum / f64::from(stats.days);
        stats.lowest_average = lowest_sum / f64::from(stats.days);
    }
    stats
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Builds a history row for `date` with flat prices.
    pub(crate) fn day(type_id: i32, region_id: i32, date: NaiveDate, average: f64, volume: i64) -> HistoryRecord {
        HistoryRecord {
            region_id,
            type_id,
            date,
            average,
            highest: average + 1.0,
            lowest: average - 1.0,
            volume,
            order_count: 3,
        }
    }
}
