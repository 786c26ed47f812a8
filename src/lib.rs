//! # market-sync-gateway
//!
//! Mirrors market order books and daily trading history from a rate-limited,
//! paginated remote API into PostgreSQL, and serves the hottest reads from
//! an in-process cache.
//!
//! Order books are fetched per venue as a whole: the page count is probed
//! first, pages are fetched concurrently under a shared token bucket, and
//! the venue's authoritative rows are replaced in one step before the read
//! snapshot is rebuilt. Every dataset carries a refresh marker so repeated
//! requests within its interval cost no remote traffic.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── MarketService + RefreshScheduler (service/)
//!     ├── HotPathCache (cache/)
//!     ├── EventBus, KeyedLease (domain/)
//!     │
//!     ├── RateLimiter → FetchOrchestrator → EsiClient (remote/)
//!     │
//!     └── MarketStore: PostgreSQL or in-memory (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod remote;
pub mod service;
pub mod ws;
