//! PostgreSQL implementation of the market store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::models::{HistoryRow, OrderLevelRow, SummaryRow};
use super::{CacheTable, MarketStore};
use crate::domain::{HistoryOrder, HistoryRecord, OrderBookTop, OrderRecord, Quote, VenueSummary};
use crate::error::SyncError;

/// Rows per multi-row `INSERT` (11 binds per order row stays well under the
/// 65 535 bind-parameter limit).
const INSERT_CHUNK: usize = 1_000;

fn persistence(e: sqlx::Error) -> SyncError {
    SyncError::Persistence(e.to_string())
}

/// PostgreSQL-backed market store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `url` and applies the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if the connection or a migration
    /// fails.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        min_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, SyncError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(connect_timeout)
            .connect(url)
            .await
            .map_err(persistence)?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| SyncError::Persistence(e.to_string()))?;
        tracing::info!("database migrations applied");
        Ok(Self::new(pool))
    }

    async fn copy_in_transaction(&self, table: CacheTable) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        // Writers wait; plain readers keep seeing the previous generation
        // until commit.
        sqlx::query(&format!("LOCK TABLE {} IN EXCLUSIVE MODE", table.cache()))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM {}", table.cache()))
            .execute(&mut *tx)
            .await?;
        let copied = sqlx::query(&format!(
            "INSERT INTO {} SELECT * FROM {}",
            table.cache(),
            table.base()
        ))
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;
        Ok(copied)
    }

    async fn side(
        &self,
        location_id: i64,
        type_id: i32,
        buy: bool,
        limit: u32,
    ) -> Result<Vec<OrderLevelRow>, SyncError> {
        let direction = if buy { "DESC" } else { "ASC" };
        sqlx::query_as::<_, OrderLevelRow>(&format!(
            "SELECT order_id, price, volume_remain FROM market_orders_cache \
             WHERE location_id = $1 AND type_id = $2 AND is_buy_order = $3 \
             ORDER BY price {direction} LIMIT $4"
        ))
        .bind(location_id)
        .bind(type_id)
        .bind(buy)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)
    }
}

#[async_trait]
impl MarketStore for PostgresStore {
    async fn refresh_marker(&self, id: &str) -> Result<Option<DateTime<Utc>>, SyncError> {
        sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT last_refresh FROM refresh_markers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)
    }

    async fn upsert_refresh_marker(&self, id: &str, at: DateTime<Utc>) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO refresh_markers (id, last_refresh) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE \
             SET last_refresh = GREATEST(refresh_markers.last_refresh, EXCLUDED.last_refresh)",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(())
    }

    async fn replace_orders(
        &self,
        location_id: i64,
        orders: &[OrderRecord],
    ) -> Result<u64, SyncError> {
        let mut tx = self.pool.begin().await.map_err(persistence)?;
        let deleted = sqlx::query("DELETE FROM market_orders WHERE location_id = $1")
            .bind(location_id)
            .execute(&mut *tx)
            .await
            .map_err(persistence)?
            .rows_affected();

        let mut inserted = 0;
        for chunk in orders.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
                "INSERT INTO market_orders (order_id, type_id, location_id, price, \
                 volume_remain, volume_total, is_buy_order, issued, duration, min_volume, \
                 order_range) ",
            );
            builder.push_values(chunk, |mut row, order| {
                row.push_bind(order.order_id)
                    .push_bind(order.type_id)
                    .push_bind(order.location_id)
                    .push_bind(order.price)
                    .push_bind(order.volume_remain)
                    .push_bind(order.volume_total)
                    .push_bind(order.is_buy_order)
                    .push_bind(order.issued)
                    .push_bind(order.duration)
                    .push_bind(order.min_volume)
                    .push_bind(order.range.as_str());
            });
            builder.push(" ON CONFLICT (order_id) DO NOTHING");
            inserted += builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(persistence)?
                .rows_affected();
        }
        tx.commit().await.map_err(persistence)?;

        tracing::debug!(location_id, deleted, inserted, "venue orders replaced");
        Ok(inserted)
    }

    async fn count_orders(&self, location_id: i64) -> Result<u64, SyncError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM market_orders WHERE location_id = $1",
        )
        .bind(location_id)
        .fetch_one(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn insert_history(&self, records: &[HistoryRecord]) -> Result<u64, SyncError> {
        let mut inserted = 0;
        for chunk in records.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
                "INSERT INTO market_history (region_id, type_id, date, average, highest, \
                 lowest, volume, order_count) ",
            );
            builder.push_values(chunk, |mut row, day| {
                row.push_bind(day.region_id)
                    .push_bind(day.type_id)
                    .push_bind(day.date)
                    .push_bind(day.average)
                    .push_bind(day.highest)
                    .push_bind(day.lowest)
                    .push_bind(day.volume)
                    .push_bind(day.order_count);
            });
            builder.push(" ON CONFLICT (region_id, type_id, date) DO NOTHING");
            inserted += builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(persistence)?
                .rows_affected();
        }
        Ok(inserted)
    }

    async fn copy_base_to_cache(&self, table: CacheTable) -> Result<u64, SyncError> {
        match self.copy_in_transaction(table).await {
            Ok(copied) => {
                tracing::info!(
                    base = table.base(),
                    cache = table.cache(),
                    rows = copied,
                    "snapshot materialized"
                );
                Ok(copied)
            }
            Err(e) => {
                tracing::error!(
                    base = table.base(),
                    cache = table.cache(),
                    error = %e,
                    "snapshot materialization failed"
                );
                Err(table.failure(e.to_string()))
            }
        }
    }

    async fn best_quote(&self, location_id: i64, type_id: i32) -> Result<Quote, SyncError> {
        let (max_buy, min_sell) = sqlx::query_as::<_, (Option<f64>, Option<f64>)>(
            "SELECT MAX(price) FILTER (WHERE is_buy_order), \
                    MIN(price) FILTER (WHERE NOT is_buy_order) \
             FROM market_orders_cache WHERE location_id = $1 AND type_id = $2",
        )
        .bind(location_id)
        .bind(type_id)
        .fetch_one(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(Quote::from_extremes(type_id, location_id, max_buy, min_sell))
    }

    async fn top_orders(
        &self,
        location_id: i64,
        type_id: i32,
        limit: u32,
    ) -> Result<OrderBookTop, SyncError> {
        let buy = self.side(location_id, type_id, true, limit).await?;
        let sell = self.side(location_id, type_id, false, limit).await?;
        Ok(OrderBookTop {
            buy: buy.into_iter().map(Into::into).collect(),
            sell: sell.into_iter().map(Into::into).collect(),
        })
    }

    async fn venue_summary(&self, location_id: i64) -> Result<VenueSummary, SyncError> {
        let row = sqlx::query_as::<_, SummaryRow>(
            "SELECT COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE is_buy_order) AS buy, \
                    COUNT(*) FILTER (WHERE NOT is_buy_order) AS sell, \
                    COUNT(DISTINCT type_id) AS distinct_types \
             FROM market_orders_cache WHERE location_id = $1",
        )
        .bind(location_id)
        .fetch_one(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(row.into())
    }

    async fn history(
        &self,
        type_id: i32,
        region_id: i32,
        order: HistoryOrder,
        since: Option<NaiveDate>,
    ) -> Result<Vec<HistoryRecord>, SyncError> {
        let direction = match order {
            HistoryOrder::Asc => "ASC",
            HistoryOrder::Desc => "DESC",
        };
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT region_id, type_id, date, average, highest, lowest, volume, order_count \
             FROM market_history \
             WHERE type_id = $1 AND region_id = $2 AND ($3::date IS NULL OR date >= $3) \
             ORDER BY date {direction}"
        ))
        .bind(type_id)
        .bind(region_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
