//! Service layer: refresh orchestration and read paths.
//!
//! [`MarketService`] coordinates the remote source, the store, the
//! [`RefreshScheduler`] and the hot-path cache, and emits progress through
//! the [`super::domain::EventBus`].

pub mod market_service;
pub mod report;
pub mod scheduler;

pub use market_service::{DEFAULT_TOP_ORDERS, MarketService, ServiceSettings};
pub use report::{
    HistoryBatchReport, HistorySeries, IngestReport, RefreshReport, RegionHistoryStats,
    VenueStatus,
};
pub use scheduler::{Interval, RefreshScheduler};
