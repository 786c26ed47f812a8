//! Quote, order book and venue DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::service::{DEFAULT_TOP_ORDERS, VenueStatus};

/// Largest accepted `limit` for `GET /orders/{type_id}`.
pub const MAX_TOP_ORDERS: u32 = 100;

/// Query parameters selecting a venue.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VenueQuery {
    /// Venue name; the first configured venue when omitted.
    #[serde(default)]
    pub venue: Option<String>,
}

/// Query parameters for `GET /orders/{type_id}`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrdersQuery {
    /// Venue name; the first configured venue when omitted.
    #[serde(default)]
    pub venue: Option<String>,
    /// Orders per side (default 5, max 100).
    #[serde(default)]
    pub limit: Option<u32>,
}

impl OrdersQuery {
    /// Requested limit, defaulted and clamped to `1..=MAX_TOP_ORDERS`.
    #[must_use]
    pub fn clamped_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_TOP_ORDERS)
            .clamp(1, MAX_TOP_ORDERS)
    }
}

/// Response body for `GET /venues`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VenueListResponse {
    /// Snapshot counts per venue.
    pub data: Vec<VenueStatus>,
    /// Human-readable rendering of `data`.
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_defaulted_and_clamped() {
        assert_eq!(OrdersQuery::default().clamped_limit(), DEFAULT_TOP_ORDERS);
        let huge = OrdersQuery {
            venue: None,
            limit: Some(10_000),
        };
        assert_eq!(huge.clamped_limit(), MAX_TOP_ORDERS);
        let zero = OrdersQuery {
            venue: None,
            limit: Some(0),
        };
        assert_eq!(zero.clamped_limit(), 1);
    }
}
