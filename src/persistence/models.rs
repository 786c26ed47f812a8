//! Database row models for history and order book reads.

use chrono::NaiveDate;

use crate::domain::{HistoryRecord, OrderLevel, VenueSummary};

/// A row from the `market_history` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HistoryRow {
    /// Region id.
    pub region_id: i32,
    /// Item type id.
    pub type_id: i32,
    /// Trading day.
    pub date: NaiveDate,
    /// Average price.
    pub average: f64,
    /// Highest price.
    pub highest: f64,
    /// Lowest price.
    pub lowest: f64,
    /// Units traded.
    pub volume: i64,
    /// Orders filled.
    pub order_count: i64,
}

impl From<HistoryRow> for HistoryRecord {
    fn from(row: HistoryRow) -> Self {
        Self {
            region_id: row.region_id,
            type_id: row.type_id,
            date: row.date,
            average: row.average,
            highest: row.highest,
            lowest: row.lowest,
            volume: row.volume,
            order_count: row.order_count,
        }
    }
}

/// One price level selected from `market_orders_cache`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderLevelRow {
    /// Order id.
    pub order_id: i64,
    /// Unit price.
    pub price: f64,
    /// Units still open.
    pub volume_remain: i64,
}

impl From<OrderLevelRow> for OrderLevel {
    fn from(row: OrderLevelRow) -> Self {
        Self {
            order_id: row.order_id,
            price: row.price,
            volume_remain: row.volume_remain,
        }
    }
}

/// Aggregate counts selected from `market_orders_cache`.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct SummaryRow {
    /// All orders.
    pub total: i64,
    /// Buy orders.
    pub buy: i64,
    /// Sell orders.
    pub sell: i64,
    /// Distinct item types.
    pub distinct_types: i64,
}

impl From<SummaryRow> for VenueSummary {
    fn from(row: SummaryRow) -> Self {
        let count = |n: i64| u64::try_from(n).unwrap_or(0);
        Self {
            total: count(row.total),
            buy: count(row.buy),
            sell: count(row.sell),
            distinct_types: count(row.distinct_types),
        }
    }
}
