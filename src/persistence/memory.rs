//! In-memory market store.
//!
//! Mirrors the PostgreSQL semantics (full replace per venue, ignore-conflict
//! history, whole-table snapshot copy) behind one [`tokio::sync::RwLock`].
//! Used when persistence is disabled and throughout the tests.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use super::{CacheTable, MarketStore};
use crate::domain::{
    HistoryOrder, HistoryRecord, OrderBookTop, OrderLevel, OrderRecord, Quote, VenueSummary,
};
use crate::error::SyncError;

#[derive(Debug, Default)]
struct State {
    markers: HashMap<String, DateTime<Utc>>,
    orders: BTreeMap<i64, OrderRecord>,
    orders_cache: BTreeMap<i64, OrderRecord>,
    history: BTreeMap<(i32, i32, NaiveDate), HistoryRecord>,
}

/// Process-local [`MarketStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn level(order: &OrderRecord) -> OrderLevel {
    OrderLevel {
        order_id: order.order_id,
        price: order.price,
        volume_remain: order.volume_remain,
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn refresh_marker(&self, id: &str) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(self.state.read().await.markers.get(id).copied())
    }

    async fn upsert_refresh_marker(&self, id: &str, at: DateTime<Utc>) -> Result<(), SyncError> {
        let mut state = self.state.write().await;
        let marker = state.markers.entry(id.to_string()).or_insert(at);
        *marker = (*marker).max(at);
        Ok(())
    }

    async fn replace_orders(
        &self,
        location_id: i64,
        orders: &[OrderRecord],
    ) -> Result<u64, SyncError> {
        let mut state = self.state.write().await;
        state.orders.retain(|_, o| o.location_id != location_id);
        let mut inserted = 0;
        for order in orders {
            if !state.orders.contains_key(&order.order_id) {
                state.orders.insert(order.order_id, order.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn count_orders(&self, location_id: i64) -> Result<u64, SyncError> {
        let state = self.state.read().await;
        let count = state
            .orders
            .values()
            .filter(|o| o.location_id == location_id)
            .count();
        Ok(count as u64)
    }

    async fn insert_history(&self, records: &[HistoryRecord]) -> Result<u64, SyncError> {
        let mut state = self.state.write().await;
        let mut inserted = 0;
        for record in records {
            let key = (record.region_id, record.type_id, record.date);
            if let std::collections::btree_map::Entry::Vacant(slot) = state.history.entry(key) {
                slot.insert(record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn copy_base_to_cache(&self, table: CacheTable) -> Result<u64, SyncError> {
        let mut state = self.state.write().await;
        match table {
            CacheTable::MarketOrders => {
                state.orders_cache = state.orders.clone();
                tracing::info!(
                    base = table.base(),
                    cache = table.cache(),
                    rows = state.orders_cache.len(),
                    "snapshot materialized"
                );
                Ok(state.orders_cache.len() as u64)
            }
        }
    }

    async fn best_quote(&self, location_id: i64, type_id: i32) -> Result<Quote, SyncError> {
        let state = self.state.read().await;
        let scoped = state
            .orders_cache
            .values()
            .filter(|o| o.location_id == location_id && o.type_id == type_id);
        let (mut max_buy, mut min_sell): (Option<f64>, Option<f64>) = (None, None);
        for order in scoped {
            if order.is_buy_order {
                max_buy = Some(max_buy.map_or(order.price, |p| p.max(order.price)));
            } else {
                min_sell = Some(min_sell.map_or(order.price, |p| p.min(order.price)));
            }
        }
        Ok(Quote::from_extremes(type_id, location_id, max_buy, min_sell))
    }

    async fn top_orders(
        &self,
        location_id: i64,
        type_id: i32,
        limit: u32,
    ) -> Result<OrderBookTop, SyncError> {
        let state = self.state.read().await;
        let (mut buy, mut sell): (Vec<&OrderRecord>, Vec<&OrderRecord>) = state
            .orders_cache
            .values()
            .filter(|o| o.location_id == location_id && o.type_id == type_id)
            .partition(|o| o.is_buy_order);
        buy.sort_by(|a, b| b.price.total_cmp(&a.price));
        sell.sort_by(|a, b| a.price.total_cmp(&b.price));
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(OrderBookTop {
            buy: buy.into_iter().take(limit).map(level).collect(),
            sell: sell.into_iter().take(limit).map(level).collect(),
        })
    }

    async fn venue_summary(&self, location_id: i64) -> Result<VenueSummary, SyncError> {
        let state = self.state.read().await;
        let mut summary = VenueSummary::default();
        let mut types = HashSet::new();
        for order in state.orders_cache.values().filter(|o| o.location_id == location_id) {
            summary.total += 1;
            if order.is_buy_order {
                summary.buy += 1;
            } else {
                summary.sell += 1;
            }
            types.insert(order.type_id);
        }
        summary.distinct_types = types.len() as u64;
        Ok(summary)
    }

    async fn history(
        &self,
        type_id: i32,
        region_id: i32,
        order: HistoryOrder,
        since: Option<NaiveDate>,
    ) -> Result<Vec<HistoryRecord>, SyncError> {
        let state = self.state.read().await;
        let mut rows: Vec<HistoryRecord> = state
            .history
            .range((region_id, type_id, NaiveDate::MIN)..=(region_id, type_id, NaiveDate::MAX))
            .map(|(_, r)| r)
            .filter(|r| since.is_none_or(|s| r.date >= s))
            .cloned()
            .collect();
        if order == HistoryOrder::Desc {
            rows.reverse();
        }
        Ok(rows)
    }
}
