//! HTTP client for the EVE Swagger Interface market endpoints.
//!
//! Order books are paginated: the page count is reported in the `X-Pages`
//! response header and pages past the end answer `404`. History is a single
//! unpaginated array per `(region, type)`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{MarketDataSource, Page};
use crate::domain::{HistoryRecord, OrderRecord, Venue, VenueSource};
use crate::error::{FetchError, SyncError};

const PAGE_COUNT_HEADER: &str = "x-pages";

/// One day of history as returned by the remote (no region/type columns).
#[derive(Debug, Deserialize)]
struct EsiHistoryDay {
    date: NaiveDate,
    average: f64,
    highest: f64,
    lowest: f64,
    volume: i64,
    order_count: i64,
}

impl EsiHistoryDay {
    fn into_record(self, region_id: i32, type_id: i32) -> HistoryRecord {
        HistoryRecord {
            region_id,
            type_id,
            date: self.date,
            average: self.average,
            highest: self.highest,
            lowest: self.lowest,
            volume: self.volume,
            order_count: self.order_count,
        }
    }
}

/// `reqwest`-backed [`MarketDataSource`].
#[derive(Debug, Clone)]
pub struct EsiClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
    timeout: Duration,
}

impl EsiClient {
    /// Builds a client with a per-request timeout and `User-Agent`.
    ///
    /// `access_token` is sent as a bearer token to structure markets only.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        user_agent: &str,
        timeout: Duration,
        access_token: Option<String>,
    ) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            timeout,
        })
    }

    fn orders_url(&self, venue: &Venue) -> String {
        match venue.source {
            VenueSource::Region { region_id } => {
                format!("{}/markets/{region_id}/orders/", self.base_url)
            }
            VenueSource::Structure { structure_id } => {
                format!("{}/markets/structures/{structure_id}/", self.base_url)
            }
        }
    }

    fn history_url(&self, region_id: i32) -> String {
        format!("{}/markets/{region_id}/history/", self.base_url)
    }

    fn transport_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(err)
        }
    }
}

#[async_trait]
impl MarketDataSource for EsiClient {
    async fn fetch_orders_page(
        &self,
        venue: &Venue,
        page: u32,
    ) -> Result<Page<OrderRecord>, FetchError> {
        let url = self.orders_url(venue);
        let mut request = self.http.get(&url).query(&[("page", page)]);
        match venue.source {
            VenueSource::Region { .. } => request = request.query(&[("order_type", "all")]),
            VenueSource::Structure { .. } => {
                if let Some(token) = &self.access_token {
                    request = request.bearer_auth(token);
                }
            }
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::OutOfRange { page });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let total_pages = response
            .headers()
            .get(PAGE_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let items = response
            .json::<Vec<OrderRecord>>()
            .await
            .map_err(FetchError::Decode)?;
        Ok(Page { items, total_pages })
    }

    async fn fetch_history(
        &self,
        region_id: i32,
        type_id: i32,
    ) -> Result<Vec<HistoryRecord>, FetchError> {
        let url = self.history_url(region_id);
        let response = self
            .http
            .get(&url)
            .query(&[("type_id", type_id)])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(region_id, type_id, "no history published");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let days = response
            .json::<Vec<EsiHistoryDay>>()
            .await
            .map_err(FetchError::Decode)?;
        Ok(days
            .into_iter()
            .map(|day| day.into_record(region_id, type_id))
            .collect())
    }
}
