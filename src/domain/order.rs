//! Live market orders and the read models derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One live order in a venue's order book, as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderRecord {
    /// Remote order id (unique across venues).
    pub order_id: i64,
    /// Item type id.
    pub type_id: i32,
    /// Station or structure the order lives in.
    pub location_id: i64,
    /// Unit price.
    pub price: f64,
    /// Units still open.
    pub volume_remain: i64,
    /// Units at creation.
    #[serde(default)]
    pub volume_total: i64,
    /// `true` for bids, `false` for asks.
    pub is_buy_order: bool,
    /// Creation time.
    pub issued: DateTime<Utc>,
    /// Lifetime in days.
    pub duration: i32,
    /// Minimum fill size.
    #[serde(default)]
    pub min_volume: i32,
    /// Buy order range (`station`, `region`, jump count).
    #[serde(default)]
    pub range: String,
}

/// Best bid and ask for one type at one venue.
///
/// A side without orders is reported as `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct Quote {
    /// Item type id.
    pub type_id: i32,
    /// Venue location id.
    pub location_id: i64,
    /// Highest buy price.
    pub best_bid: f64,
    /// Lowest sell price.
    pub best_ask: f64,
}

impl Quote {
    /// Builds a quote from optional aggregate prices.
    #[must_use]
    pub fn from_extremes(
        type_id: i32,
        location_id: i64,
        max_buy: Option<f64>,
        min_sell: Option<f64>,
    ) -> Self {
        Self {
            type_id,
            location_id,
            best_bid: max_buy.unwrap_or(0.0),
            best_ask: min_sell.unwrap_or(0.0),
        }
    }
}

/// One price level shown in an order book excerpt.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OrderLevel {
    /// Remote order id.
    pub order_id: i64,
    /// Unit price.
    pub price: f64,
    /// Units still open.
    pub volume_remain: i64,
}

/// Top of the book for one type at one venue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct OrderBookTop {
    /// Buy orders, highest price first.
    pub buy: Vec<OrderLevel>,
    /// Sell orders, lowest price first.
    pub sell: Vec<OrderLevel>,
}

/// Order counts for one venue in the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct VenueSummary {
    /// All orders.
    pub total: u64,
    /// Buy orders.
    pub buy: u64,
    /// Sell orders.
    pub sell: u64,
    /// Distinct item types.
    pub distinct_types: u64,
}

/// Keeps only the orders located at `location_id`, dropping repeated order
/// ids (an order can move across page boundaries while pages are fetched).
#[must_use]
pub fn scope_to_location(
    pages: impl IntoIterator<Item = Vec<OrderRecord>>,
    location_id: i64,
) -> Vec<OrderRecord> {
    let mut seen = std::collections::HashSet::new();
    pages
        .into_iter()
        .flatten()
        .filter(|o| o.location_id == location_id && seen.insert(o.order_id))
        .collect()
}
