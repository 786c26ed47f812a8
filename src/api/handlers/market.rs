//! Order book read handlers: quotes, top orders, venues.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{OrdersQuery, VenueListResponse, VenueQuery};
use crate::app_state::AppState;
use crate::domain::{OrderBookTop, Quote};
use crate::error::{ErrorResponse, SyncError};
use crate::service::report::render_summary;

/// `GET /quotes/{type_id}` — Best bid and ask at a venue.
///
/// # Errors
///
/// Returns [`SyncError::UnknownVenue`] or a persistence error.
#[utoipa::path(
    get,
    path = "/api/v1/quotes/{type_id}",
    tag = "Market",
    summary = "Latest quote",
    description = "Highest buy and lowest sell price of an item at a venue, read from the snapshot through the hot-path cache. Missing sides are 0.",
    params(
        ("type_id" = i32, Path, description = "Item type id"),
        VenueQuery,
    ),
    responses(
        (status = 200, description = "Best bid and ask", body = Quote),
        (status = 404, description = "Unknown venue", body = ErrorResponse),
    )
)]
pub async fn get_quote(
    State(state): State<AppState>,
    Path(type_id): Path<i32>,
    Query(query): Query<VenueQuery>,
) -> Result<impl IntoResponse, SyncError> {
    let quote = state
        .market_service
        .latest_quote(type_id, query.venue.as_deref())
        .await?;
    Ok(Json(quote))
}

/// `GET /orders/{type_id}` — Best orders on each side.
///
/// # Errors
///
/// Returns [`SyncError::UnknownVenue`] or a persistence error.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{type_id}",
    tag = "Market",
    summary = "Top of the order book",
    description = "Best buy orders (price descending) and best sell orders (price ascending) of an item at a venue.",
    params(
        ("type_id" = i32, Path, description = "Item type id"),
        OrdersQuery,
    ),
    responses(
        (status = 200, description = "Top orders", body = OrderBookTop),
        (status = 404, description = "Unknown venue", body = ErrorResponse),
    )
)]
pub async fn get_top_orders(
    State(state): State<AppState>,
    Path(type_id): Path<i32>,
    Query(query): Query<OrdersQuery>,
) -> Result<impl IntoResponse, SyncError> {
    let top = state
        .market_service
        .top_orders(type_id, query.venue.as_deref(), query.clamped_limit())
        .await?;
    Ok(Json(top))
}

/// `GET /venues` — Snapshot counts per venue.
///
/// # Errors
///
/// Returns a persistence error if a count fails.
#[utoipa::path(
    get,
    path = "/api/v1/venues",
    tag = "Market",
    summary = "List venues",
    description = "Configured venues with their snapshot order counts and last refresh time.",
    responses(
        (status = 200, description = "Venue list", body = VenueListResponse),
    )
)]
pub async fn list_venues(State(state): State<AppState>) -> Result<impl IntoResponse, SyncError> {
    let data = state.market_service.venue_summaries().await?;
    let summary = render_summary(&data);
    Ok(Json(VenueListResponse { data, summary }))
}

/// Market read routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/quotes/{type_id}", get(get_quote))
        .route("/orders/{type_id}", get(get_top_orders))
        .route("/venues", get(list_venues))
}
