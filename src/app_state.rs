//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::service::MarketService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Market service for refreshes and reads.
    pub market_service: Arc<MarketService>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}

impl AppState {
    /// Builds the state around `market_service`, sharing its event bus.
    #[must_use]
    pub fn new(market_service: Arc<MarketService>) -> Self {
        let event_bus = market_service.event_bus().clone();
        Self {
            market_service,
            event_bus,
        }
    }
}
