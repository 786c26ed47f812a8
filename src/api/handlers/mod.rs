//! REST endpoint handlers organized by resource.

pub mod history;
pub mod market;
pub mod refresh;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(refresh::routes())
        .merge(market::routes())
        .merge(history::routes())
}
