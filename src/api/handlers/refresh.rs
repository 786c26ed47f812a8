//! Refresh trigger handler.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::RefreshRequest;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, SyncError};
use crate::service::RefreshReport;

/// `POST /refresh` — Refresh a dataset if it is stale.
///
/// # Errors
///
/// Returns [`SyncError`] on an unknown dataset or venue, a store failure,
/// or when no venue could be fetched.
#[utoipa::path(
    post,
    path = "/api/v1/refresh",
    tag = "Refresh",
    summary = "Refresh a dataset",
    description = "Fetches the dataset from the remote API when its refresh interval has elapsed (or unconditionally with `force`), rebuilds the snapshot and returns a per-venue report. A fresh dataset returns `refreshed: false` without any remote request.",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Refresh finished or skipped", body = RefreshReport),
        (status = 400, description = "Unknown dataset key", body = ErrorResponse),
        (status = 404, description = "Unknown venue", body = ErrorResponse),
        (status = 500, description = "Store or materialization failure", body = ErrorResponse),
        (status = 502, description = "Remote API unavailable", body = ErrorResponse),
    )
)]
pub async fn refresh_dataset(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, SyncError> {
    let key = req.key()?;
    let report = state.market_service.refresh(&key, req.force).await?;
    Ok(Json(report))
}

/// Refresh routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/refresh", post(refresh_dataset))
}
