//! REST API layer: route handlers, DTOs, and router composition.
//!
//! All resource endpoints are mounted under `/api/v1`; `/health`, `/ws` and
//! the optional Swagger UI live at the root.

pub mod dto;
pub mod handlers;
pub mod openapi;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

pub use openapi::ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

/// Builds the full application: REST, WebSocket, docs and HTTP layers.
pub fn build_app(state: AppState) -> Router {
    let router = Router::new()
        .merge(build_router())
        .route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi as _;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
    };

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
