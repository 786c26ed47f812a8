//! Persistence layer: refresh markers, authoritative market tables and the
//! read-optimized snapshot.
//!
//! [`MarketStore`] is the seam between the service and storage. The
//! PostgreSQL implementation runs on `sqlx::PgPool`; the in-memory one backs
//! `PERSISTENCE_ENABLED=false` deployments and tests.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{HistoryOrder, HistoryRecord, OrderBookTop, OrderRecord, Quote, VenueSummary};
use crate::error::SyncError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// An authoritative table and the snapshot materialized from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTable {
    /// `market_orders` → `market_orders_cache`.
    MarketOrders,
}

impl CacheTable {
    /// Authoritative (source) table name.
    #[must_use]
    pub const fn base(self) -> &'static str {
        match self {
            Self::MarketOrders => "market_orders",
        }
    }

    /// Snapshot (destination) table name.
    #[must_use]
    pub const fn cache(self) -> &'static str {
        match self {
            Self::MarketOrders => "market_orders_cache",
        }
    }

    /// Builds the error reported when materializing this pair fails.
    #[must_use]
    pub fn failure(self, message: impl Into<String>) -> SyncError {
        SyncError::Materialization {
            base: self.base(),
            cache: self.cache(),
            message: message.into(),
        }
    }
}

/// Storage operations used by the synchronization service.
///
/// Order writes go to the authoritative table; order reads are served from
/// the snapshot so they never observe a venue mid-replacement.
#[async_trait]
pub trait MarketStore: Send + Sync + std::fmt::Debug {
    /// Returns the last successful refresh of dataset `id`, if any.
    async fn refresh_marker(&self, id: &str) -> Result<Option<DateTime<Utc>>, SyncError>;

    /// Creates or advances the marker of dataset `id`. A marker never moves
    /// backwards.
    async fn upsert_refresh_marker(&self, id: &str, at: DateTime<Utc>) -> Result<(), SyncError>;

    /// Replaces every authoritative order at `location_id` with `orders`.
    ///
    /// Returns the number of rows inserted.
    async fn replace_orders(
        &self,
        location_id: i64,
        orders: &[OrderRecord],
    ) -> Result<u64, SyncError>;

    /// Counts authoritative orders at `location_id`.
    async fn count_orders(&self, location_id: i64) -> Result<u64, SyncError>;

    /// Appends history rows, silently ignoring rows whose
    /// `(region_id, type_id, date)` already exists.
    ///
    /// Returns the number of rows actually inserted.
    async fn insert_history(&self, records: &[HistoryRecord]) -> Result<u64, SyncError>;

    /// Rebuilds the snapshot of `table` from its authoritative table.
    ///
    /// Returns the number of rows copied.
    async fn copy_base_to_cache(&self, table: CacheTable) -> Result<u64, SyncError>;

    /// Best bid and ask for `type_id` at `location_id`, from the snapshot.
    async fn best_quote(&self, location_id: i64, type_id: i32) -> Result<Quote, SyncError>;

    /// Best `limit` orders per side for `type_id` at `location_id`, from the
    /// snapshot.
    async fn top_orders(
        &self,
        location_id: i64,
        type_id: i32,
        limit: u32,
    ) -> Result<OrderBookTop, SyncError>;

    /// Order counts at `location_id`, from the snapshot.
    async fn venue_summary(&self, location_id: i64) -> Result<VenueSummary, SyncError>;

    /// Daily history of `type_id` in `region_id`, ordered by date, optionally
    /// starting at `since`.
    async fn history(
        &self,
        type_id: i32,
        region_id: i32,
        order: HistoryOrder,
        since: Option<NaiveDate>,
    ) -> Result<Vec<HistoryRecord>, SyncError>;
}
