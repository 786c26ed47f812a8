//! History handlers: series reads, statistics, batch refresh.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{HistoryBatchRequest, HistoryBatchResponse, HistoryQuery, StatsQuery};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, SyncError};
use crate::service::{HistoryBatchReport, HistorySeries, RegionHistoryStats};

/// `GET /history/{region_id}/{type_id}` — Stored daily history.
///
/// # Errors
///
/// Returns a persistence error if the read fails.
#[utoipa::path(
    get,
    path = "/api/v1/history/{region_id}/{type_id}",
    tag = "History",
    summary = "Daily history",
    description = "Stored daily history of an item in a region, newest first unless `order=asc`. Does not trigger a remote fetch.",
    params(
        ("region_id" = i32, Path, description = "Region id"),
        ("type_id" = i32, Path, description = "Item type id"),
        HistoryQuery,
    ),
    responses(
        (status = 200, description = "History series", body = HistorySeries),
    )
)]
pub async fn get_history(
    State(state): State<AppState>,
    Path((region_id, type_id)): Path<(i32, i32)>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, SyncError> {
    let records = state
        .market_service
        .history(type_id, region_id, query.order)
        .await?;
    Ok(Json(HistorySeries {
        type_id,
        region_id,
        records,
    }))
}

/// `GET /history/{region_id}/{type_id}/stats` — Window statistics.
///
/// # Errors
///
/// Returns [`SyncError::InvalidRequest`] on a malformed `also` list or a
/// persistence error.
#[utoipa::path(
    get,
    path = "/api/v1/history/{region_id}/{type_id}/stats",
    tag = "History",
    summary = "History statistics",
    description = "Week, month and year aggregates (ISK flow, highest and lowest average price, volume) for the path region and any extra regions listed in `also`.",
    params(
        ("region_id" = i32, Path, description = "Region id"),
        ("type_id" = i32, Path, description = "Item type id"),
        StatsQuery,
    ),
    responses(
        (status = 200, description = "Statistics per region", body = Vec<RegionHistoryStats>),
        (status = 400, description = "Malformed region list", body = ErrorResponse),
    )
)]
pub async fn get_history_stats(
    State(state): State<AppState>,
    Path((region_id, type_id)): Path<(i32, i32)>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, SyncError> {
    let regions = query.regions(region_id)?;
    let stats = state.market_service.history_stats(type_id, &regions).await?;
    Ok(Json(stats))
}

/// `POST /history/refresh` — Refresh the stale ids of a batch.
///
/// # Errors
///
/// Returns [`SyncError::InvalidRequest`] on an empty or oversized batch, or
/// a persistence error.
#[utoipa::path(
    post,
    path = "/api/v1/history/refresh",
    tag = "History",
    summary = "Refresh history batch",
    description = "Fetches history only for the type ids whose refresh interval has elapsed. Individual fetch failures are listed in the report.",
    request_body = HistoryBatchRequest,
    responses(
        (status = 200, description = "Batch report", body = HistoryBatchReport),
        (status = 400, description = "Invalid batch", body = ErrorResponse),
    )
)]
pub async fn refresh_history_batch(
    State(state): State<AppState>,
    Json(req): Json<HistoryBatchRequest>,
) -> Result<impl IntoResponse, SyncError> {
    req.validate()?;
    let report = state
        .market_service
        .refresh_history_batch(&req.type_ids, req.region_id)
        .await?;
    Ok(Json(report))
}

/// `POST /history/batch` — Refresh stale ids, then return every series.
///
/// # Errors
///
/// Returns [`SyncError::InvalidRequest`] on an empty or oversized batch, or
/// a persistence error.
#[utoipa::path(
    post,
    path = "/api/v1/history/batch",
    tag = "History",
    summary = "Read history batch",
    description = "Refreshes the stale type ids of the batch and returns the stored series of every requested id.",
    request_body = HistoryBatchRequest,
    responses(
        (status = 200, description = "Report and series", body = HistoryBatchResponse),
        (status = 400, description = "Invalid batch", body = ErrorResponse),
    )
)]
pub async fn history_batch(
    State(state): State<AppState>,
    Json(req): Json<HistoryBatchRequest>,
) -> Result<impl IntoResponse, SyncError> {
    req.validate()?;
    let (report, data) = state
        .market_service
        .history_batch(&req.type_ids, req.region_id, req.order)
        .await?;
    Ok(Json(HistoryBatchResponse { report, data }))
}

/// History routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/history/refresh", post(refresh_history_batch))
        .route("/history/batch", post(history_batch))
        .route("/history/{region_id}/{type_id}", get(get_history))
        .route("/history/{region_id}/{type_id}/stats", get(get_history_stats))
}
