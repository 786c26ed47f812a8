//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use super::handlers::{history, market, refresh, system};

/// Generated OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "market-sync-gateway",
        description = "Market order and history mirror with rate-limited remote sync."
    ),
    paths(
        refresh::refresh_dataset,
        market::get_quote,
        market::get_top_orders,
        market::list_venues,
        history::get_history,
        history::get_history_stats,
        history::refresh_history_batch,
        history::history_batch,
        system::health_handler,
    ),
    tags(
        (name = "Refresh", description = "Dataset refresh triggers"),
        (name = "Market", description = "Order book reads"),
        (name = "History", description = "Daily history reads and batches"),
        (name = "System", description = "Service health"),
    )
)]
pub struct ApiDoc;
