//! Domain layer: dataset identity, market records, and the event system.
//!
//! This module contains the market data model (venues, orders, daily
//! history), the [`DatasetKey`] that names every refreshable unit, the
//! per-dataset refresh lease, and the event bus for broadcasting refresh
//! progress.

pub mod dataset_key;
pub mod event_bus;
pub mod history;
pub mod lease;
pub mod order;
pub mod sync_event;
pub mod venue;

pub use dataset_key::DatasetKey;
pub use event_bus::EventBus;
pub use history::{HistoryOrder, HistoryRecord, HistoryStats, WindowStats};
pub use lease::{KeyedLease, LeaseGuard};
pub use order::{OrderBookTop, OrderLevel, OrderRecord, Quote, VenueSummary};
pub use sync_event::SyncEvent;
pub use venue::{Venue, VenueSource};
