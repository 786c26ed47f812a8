//! Shared fixtures for the HTTP and WebSocket tests.

#![allow(dead_code, clippy::panic)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::{NaiveDate, TimeZone, Utc};

use market_sync_gateway::api::build_app;
use market_sync_gateway::app_state::AppState;
use market_sync_gateway::cache::{CachePolicy, HotPathCache};
use market_sync_gateway::domain::venue::parse_venues;
use market_sync_gateway::domain::{EventBus, HistoryRecord, OrderRecord, Venue};
use market_sync_gateway::error::FetchError;
use market_sync_gateway::persistence::MemoryStore;
use market_sync_gateway::remote::{FetchOrchestrator, MarketDataSource, Page, RateLimiter};
use market_sync_gateway::service::{Interval, MarketService, ServiceSettings};

pub const JITA: i64 = 60003760;
pub const REGION: i32 = 10000002;

/// Remote source serving fixed order pages and history series.
#[derive(Debug, Default)]
pub struct BookSource {
    pages: Mutex<Vec<Vec<OrderRecord>>>,
    history: Mutex<HashMap<i32, Vec<HistoryRecord>>>,
    pub page_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
}

impl BookSource {
    pub fn with_pages(pages: Vec<Vec<OrderRecord>>) -> Self {
        let source = Self::default();
        *source.pages.lock().unwrap_or_else(PoisonError::into_inner) = pages;
        source
    }

    pub fn set_history(&self, type_id: i32, rows: Vec<HistoryRecord>) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(type_id, rows);
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataSource for BookSource {
    async fn fetch_orders_page(
        &self,
        _venue: &Venue,
        page: u32,
    ) -> Result<Page<OrderRecord>, FetchError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        let total = u32::try_from(pages.len()).unwrap_or(u32::MAX);
        page.checked_sub(1)
            .and_then(|i| pages.get(usize::try_from(i).ok()?))
            .map(|items| Page {
                items: items.clone(),
                total_pages: Some(total),
            })
            .ok_or(FetchError::OutOfRange { page })
    }

    async fn fetch_history(
        &self,
        _region_id: i32,
        type_id: i32,
    ) -> Result<Vec<HistoryRecord>, FetchError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn order(order_id: i64, type_id: i32, price: f64, is_buy_order: bool) -> OrderRecord {
    let Some(issued) = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single() else {
        panic!("valid timestamp");
    };
    OrderRecord {
        order_id,
        type_id,
        location_id: JITA,
        price,
        volume_remain: 10,
        volume_total: 10,
        is_buy_order,
        issued,
        duration: 90,
        min_volume: 1,
        range: "region".to_string(),
    }
}

pub fn day(type_id: i32, date: NaiveDate, average: f64) -> HistoryRecord {
    HistoryRecord {
        region_id: REGION,
        type_id,
        date,
        average,
        highest: average + 1.0,
        lowest: average - 1.0,
        volume: 100,
        order_count: 5,
    }
}

/// Two pages of Tritanium (34) orders at Jita, plus one order elsewhere.
pub fn tritanium_book() -> Vec<Vec<OrderRecord>> {
    let mut elsewhere = order(99, 34, 1.0, false);
    elsewhere.location_id = 60008494;
    vec![
        vec![order(1, 34, 4.0, true), order(2, 34, 5.5, false), elsewhere],
        vec![order(3, 34, 4.2, true), order(4, 34, 5.1, false)],
    ]
}

pub fn service(source: &Arc<BookSource>) -> Arc<MarketService> {
    let Ok(venues) = parse_venues("jita:region:10000002:60003760:1:1") else {
        panic!("venues should parse");
    };
    let Ok(limiter) = RateLimiter::new(60_000, 10_000) else {
        panic!("valid limiter");
    };
    let source: Arc<dyn MarketDataSource> = Arc::clone(source) as Arc<dyn MarketDataSource>;
    Arc::new(MarketService::new(
        Arc::new(MemoryStore::new()),
        source,
        FetchOrchestrator::new(Arc::new(limiter), 8, Duration::from_secs(5), None),
        HotPathCache::new(
            CachePolicy::new(Duration::from_secs(600), 100),
            CachePolicy::new(Duration::from_secs(36_000), 100),
        ),
        EventBus::new(1_000),
        ServiceSettings {
            venues,
            order_interval: Interval::Minutes(20),
            history_interval: Interval::Days(1),
        },
    ))
}

pub fn app(source: &Arc<BookSource>) -> Router {
    build_app(AppState::new(service(source)))
}
