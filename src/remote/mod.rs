//! Remote market data access: the source trait, the ESI client, and the
//! rate-limited, bounded fetch machinery built around it.

pub mod esi;
pub mod orchestrator;
pub mod probe;
pub mod rate_limiter;

use async_trait::async_trait;

use crate::domain::{HistoryRecord, OrderRecord, Venue};
use crate::error::FetchError;

pub use esi::EsiClient;
pub use orchestrator::{BatchOutcome, FetchFailure, FetchOrchestrator, Progress};
pub use probe::{PageProbe, find_max_page};
pub use rate_limiter::RateLimiter;

/// One page of a paginated remote resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Records on the page.
    pub items: Vec<T>,
    /// Page count reported by the remote alongside the page, if any.
    pub total_pages: Option<u32>,
}

impl<T> Page<T> {
    /// Creates a page without a reported total.
    #[must_use]
    pub const fn new(items: Vec<T>) -> Self {
        Self {
            items,
            total_pages: None,
        }
    }

    /// Returns `true` when this page should be treated as past the end of the
    /// resource: it is empty, or the remote reports fewer pages than `page`.
    #[must_use]
    pub fn is_out_of_range(&self, page: u32) -> bool {
        self.items.is_empty() || self.total_pages.is_some_and(|total| total < page)
    }
}

/// Read-only paginated market data API.
///
/// Implemented by [`EsiClient`] in production and by scripted sources in
/// tests.
#[async_trait]
pub trait MarketDataSource: Send + Sync + std::fmt::Debug {
    /// Fetches page `page` (1-based) of a venue's order book.
    ///
    /// Pages past the end yield [`FetchError::OutOfRange`] or an empty page.
    async fn fetch_orders_page(
        &self,
        venue: &Venue,
        page: u32,
    ) -> Result<Page<OrderRecord>, FetchError>;

    /// Fetches the full daily history of one type in one region.
    async fn fetch_history(
        &self,
        region_id: i32,
        type_id: i32,
    ) -> Result<Vec<HistoryRecord>, FetchError>;
}
