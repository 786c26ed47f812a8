//! Market service: refresh cycles and hot-path reads.
//!
//! A refresh takes the dataset's lease, consults the [`RefreshScheduler`],
//! and when the dataset is stale pulls it through the [`FetchOrchestrator`]
//! into the [`MarketStore`], rebuilds the snapshot, invalidates the
//! [`HotPathCache`], and finally advances the refresh marker. The marker is
//! only advanced once every store write has succeeded.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;

use super::report::{
    HistoryBatchReport, HistorySeries, IngestReport, RefreshReport, RegionHistoryStats,
    VenueStatus, render_summary,
};
use super::scheduler::{Interval, RefreshScheduler};
use crate::cache::{CacheStats, HotPathCache};
use crate::domain::order::scope_to_location;
use crate::domain::{
    DatasetKey, EventBus, HistoryOrder, HistoryRecord, HistoryStats, KeyedLease, OrderBookTop,
    Quote, SyncEvent, Venue,
};
use crate::error::{FetchError, SyncError};
use crate::persistence::{CacheTable, MarketStore};
use crate::remote::{FetchOrchestrator, MarketDataSource, Progress, find_max_page};

/// Orders shown per side by [`MarketService::top_orders`] by default.
pub const DEFAULT_TOP_ORDERS: u32 = 5;

/// Venues and staleness intervals.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Configured venues; the first is the default for quote reads.
    pub venues: Vec<Venue>,
    /// Staleness interval of order books.
    pub order_interval: Interval,
    /// Staleness interval of history series.
    pub history_interval: Interval,
}

/// Coordinates refreshes and reads over the store, the remote source and
/// the caches.
#[derive(Debug)]
pub struct MarketService {
    store: Arc<dyn MarketStore>,
    source: Arc<dyn MarketDataSource>,
    scheduler: RefreshScheduler,
    orchestrator: FetchOrchestrator,
    cache: HotPathCache,
    leases: KeyedLease,
    event_bus: EventBus,
    settings: ServiceSettings,
}

impl MarketService {
    /// Creates a new `MarketService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn MarketStore>,
        source: Arc<dyn MarketDataSource>,
        orchestrator: FetchOrchestrator,
        cache: HotPathCache,
        event_bus: EventBus,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            scheduler: RefreshScheduler::new(Arc::clone(&store)),
            store,
            source,
            orchestrator,
            cache,
            leases: KeyedLease::new(),
            event_bus,
            settings,
        }
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns the configured venues.
    #[must_use]
    pub fn venues(&self) -> &[Venue] {
        &self.settings.venues
    }

    /// Returns hot-path cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn publish(&self, event: SyncEvent) {
        let _ = self.event_bus.publish(event);
    }

    fn publish_progress(&self, dataset: &str, progress: Progress) {
        self.publish(SyncEvent::ItemFetched {
            dataset: dataset.to_string(),
            item: progress.item,
            succeeded: progress.succeeded,
            completed: progress.completed,
            total: progress.total,
            timestamp: Utc::now(),
        });
    }

    fn publish_failed(&self, dataset: &str, err: &SyncError) {
        self.publish(SyncEvent::RefreshFailed {
            dataset: dataset.to_string(),
            message: err.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Resolves a venue by name, or the default venue when `name` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownVenue`] if no venue has that name.
    pub fn venue(&self, name: Option<&str>) -> Result<&Venue, SyncError> {
        match name {
            Some(name) => {
                let wanted = name.to_lowercase();
                self.settings
                    .venues
                    .iter()
                    .find(|v| v.name == wanted)
                    .ok_or_else(|| SyncError::UnknownVenue(name.to_string()))
            }
            None => self
                .settings
                .venues
                .first()
                .ok_or_else(|| SyncError::Config("no market venues configured".to_string())),
        }
    }

    // ── Refresh ──────────────────────────────────────────────────────────

    /// Refreshes `key` if it is stale (or unconditionally with `force`).
    ///
    /// Page- and item-level fetch failures are reported in the result; store
    /// and materialization failures abort the refresh and leave its marker
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownVenue`] for an unconfigured venue,
    /// [`SyncError::Persistence`] / [`SyncError::Materialization`] on store
    /// failure, and [`SyncError::Fetch`] when no venue could be fetched.
    pub async fn refresh(&self, key: &DatasetKey, force: bool) -> Result<RefreshReport, SyncError> {
        let dataset = key.to_string();
        let result = match key {
            DatasetKey::MarketOrders => self.refresh_all_venues(force).await,
            DatasetKey::VenueOrders(name) => {
                let venue = self.venue(Some(name))?;
                self.refresh_one_venue(venue, force).await
            }
            DatasetKey::History { type_id, region_id } => {
                self.refresh_history(*type_id, *region_id, force).await
            }
        };
        if let Err(err) = &result {
            tracing::error!(dataset = %dataset, error = %err, "refresh failed");
            self.publish_failed(&dataset, err);
        }
        result
    }

    async fn is_due(&self, key: &DatasetKey, interval: Interval, force: bool) -> Result<bool, SyncError> {
        if force || self.scheduler.out_of_interval(key, interval).await? {
            return Ok(true);
        }
        tracing::debug!(dataset = %key, "dataset still fresh");
        self.publish(SyncEvent::RefreshSkipped {
            dataset: key.to_string(),
            timestamp: Utc::now(),
        });
        Ok(false)
    }

    async fn refresh_all_venues(&self, force: bool) -> Result<RefreshReport, SyncError> {
        let key = DatasetKey::MarketOrders;
        let _lease = self.leases.acquire(&key).await;
        if !self.is_due(&key, self.settings.order_interval, force).await? {
            return self
                .order_report(&key, &self.settings.venues, Vec::new(), Vec::new(), false)
                .await;
        }
        self.publish_started(&key);

        let mut ingested = Vec::new();
        let mut refreshed_venues = Vec::new();
        let mut errors = Vec::new();
        let mut first_fetch_error = None;
        for venue in &self.settings.venues {
            let venue_key = DatasetKey::venue(&venue.name);
            let _venue_lease = self.leases.acquire(&venue_key).await;
            match self.ingest_venue(venue, &key).await {
                Ok(report) => {
                    ingested.push(report);
                    refreshed_venues.push(venue.clone());
                }
                Err(SyncError::Fetch(err)) => {
                    tracing::warn!(venue = %venue, error = %err, "venue fetch failed, skipping venue");
                    errors.push(format!("{}: {err}", venue.name));
                    first_fetch_error.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }
        if refreshed_venues.is_empty()
            && let Some(err) = first_fetch_error
        {
            return Err(SyncError::Fetch(err));
        }

        self.materialize(&key).await?;
        self.cache.invalidate_all_quotes();
        for venue in &refreshed_venues {
            self.scheduler.mark_refreshed(&DatasetKey::venue(&venue.name)).await?;
        }
        if errors.is_empty() {
            self.scheduler.mark_refreshed(&key).await?;
        }

        self.order_report(&key, &refreshed_venues, ingested, errors, true).await
    }

    async fn refresh_one_venue(&self, venue: &Venue, force: bool) -> Result<RefreshReport, SyncError> {
        let key = DatasetKey::venue(&venue.name);
        let _lease = self.leases.acquire(&key).await;
        if !self.is_due(&key, self.settings.order_interval, force).await? {
            let venues = std::slice::from_ref(venue);
            return self
                .order_report(&key, venues, Vec::new(), Vec::new(), false)
                .await;
        }
        self.publish_started(&key);

        let report = self.ingest_venue(venue, &key).await?;
        self.materialize(&key).await?;
        self.cache.invalidate_quotes(venue.location_id);
        self.scheduler.mark_refreshed(&key).await?;

        self.order_report(&key, std::slice::from_ref(venue), vec![report], Vec::new(), true)
            .await
    }

    fn publish_started(&self, key: &DatasetKey) {
        tracing::info!(dataset = %key, "refresh started");
        self.publish(SyncEvent::RefreshStarted {
            dataset: key.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Probes, fetches and replaces one venue's authoritative order book.
    async fn ingest_venue(&self, venue: &Venue, key: &DatasetKey) -> Result<IngestReport, SyncError> {
        let dataset = key.to_string();
        let limiter = self.orchestrator.limiter();
        let timeout = self.orchestrator.request_timeout();
        let probe = find_max_page(
            |page| {
                let source = Arc::clone(&self.source);
                let limiter = Arc::clone(&limiter);
                let venue = venue.clone();
                async move {
                    limiter.acquire().await;
                    tokio::time::timeout(timeout, source.fetch_orders_page(&venue, page))
                        .await
                        .map_err(|_| FetchError::Timeout(timeout))?
                }
            },
            venue.probe_seed,
            venue.probe_step,
        );
        let probe = match self.orchestrator.batch_deadline() {
            Some(deadline) => tokio::time::timeout(deadline, probe)
                .await
                .map_err(|_| FetchError::Deadline)??,
            None => probe.await?,
        };
        tracing::info!(
            venue = %venue,
            pages = probe.max_page,
            probe_requests = probe.requests,
            "page count discovered"
        );

        let mut outcome = self
            .orchestrator
            .fetch_pages(
                probe.max_page,
                |page| {
                    let source = Arc::clone(&self.source);
                    let venue = venue.clone();
                    async move {
                        match source.fetch_orders_page(&venue, page).await {
                            Ok(page) => Ok(page.items),
                            // The book shrank while it was being fetched.
                            Err(FetchError::OutOfRange { .. }) => Ok(Vec::new()),
                            Err(err) => Err(err),
                        }
                    }
                },
                |progress| self.publish_progress(&dataset, progress),
            )
            .await;

        // Nothing fetched: keep the stored book and leave the marker stale.
        if outcome.successes.is_empty()
            && let Some(failure) = outcome.failures.pop()
        {
            tracing::warn!(
                venue = %venue,
                pages = probe.max_page,
                error = %failure.error,
                "every page failed, keeping stored orders"
            );
            return Err(SyncError::Fetch(failure.error));
        }

        let mut failed_pages: Vec<u32> = outcome.failures.iter().map(|f| f.key).collect();
        failed_pages.sort_unstable();
        let orders = scope_to_location(
            outcome.successes.into_iter().map(|(_, items)| items),
            venue.location_id,
        );
        let inserted = self.store.replace_orders(venue.location_id, &orders).await?;

        tracing::info!(
            venue = %venue,
            pages = probe.max_page,
            failed_pages = failed_pages.len(),
            inserted,
            "venue orders ingested"
        );
        Ok(IngestReport {
            venue: venue.name.clone(),
            pages: probe.max_page,
            probe_requests: probe.requests,
            failed_pages,
            inserted,
        })
    }

    async fn materialize(&self, key: &DatasetKey) -> Result<u64, SyncError> {
        let table = CacheTable::MarketOrders;
        let rows = self.store.copy_base_to_cache(table).await?;
        self.publish(SyncEvent::CacheMaterialized {
            dataset: key.to_string(),
            cache: table.cache().to_string(),
            rows,
            timestamp: Utc::now(),
        });
        Ok(rows)
    }

    async fn venue_status(&self, venue: &Venue) -> Result<VenueStatus, SyncError> {
        Ok(VenueStatus {
            venue: venue.name.clone(),
            location_id: venue.location_id,
            summary: self.store.venue_summary(venue.location_id).await?,
            last_refresh: self
                .scheduler
                .last_refresh(&DatasetKey::venue(&venue.name))
                .await?,
        })
    }

    async fn order_report(
        &self,
        key: &DatasetKey,
        venues: &[Venue],
        ingested: Vec<IngestReport>,
        errors: Vec<String>,
        refreshed: bool,
    ) -> Result<RefreshReport, SyncError> {
        let mut statuses = Vec::with_capacity(venues.len());
        for venue in venues {
            statuses.push(self.venue_status(venue).await?);
        }
        let records = ingested.iter().map(|r| r.inserted).sum();
        let failed_items = ingested.iter().map(|r| r.failed_pages.len()).sum::<usize>() + errors.len();
        if refreshed {
            self.publish(SyncEvent::RefreshCompleted {
                dataset: key.to_string(),
                records,
                failures: failed_items,
                timestamp: Utc::now(),
            });
            tracing::info!(dataset = %key, records, failed_items, "refresh completed");
        }
        Ok(RefreshReport {
            dataset: key.to_string(),
            refreshed,
            summary: render_summary(&statuses),
            ingested,
            venues: statuses,
            records,
            failed_items,
            errors,
        })
    }

    async fn refresh_history(
        &self,
        type_id: i32,
        region_id: i32,
        force: bool,
    ) -> Result<RefreshReport, SyncError> {
        let key = DatasetKey::history(type_id, region_id);
        let _lease = self.leases.acquire(&key).await;
        let refreshed = self.is_due(&key, self.settings.history_interval, force).await?;
        let mut report = RefreshReport {
            dataset: key.to_string(),
            refreshed,
            ingested: Vec::new(),
            venues: Vec::new(),
            records: 0,
            failed_items: 0,
            errors: Vec::new(),
            summary: String::new(),
        };
        if refreshed {
            self.publish_started(&key);
            let batch = self.ingest_history(&[type_id], region_id, &key.to_string()).await?;
            report.refreshed = !batch.ingested.is_empty();
            report.records = batch.inserted;
            report.failed_items = batch.failed.len();
            if !batch.failed.is_empty() {
                report.errors.push(format!("history fetch for type {type_id} failed"));
            }
        }
        let stored = self.history(type_id, region_id, HistoryOrder::Desc).await?;
        report.summary = format!(
            "history {type_id}@{region_id}: {} days stored, {} new",
            stored.len(),
            report.records
        );
        Ok(report)
    }

    /// Ingests history for the type ids of `region_id` whose markers are
    /// stale; fresh ids are skipped without a request.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if a marker read or a store write
    /// fails. Individual fetch failures are reported in the result.
    pub async fn refresh_history_batch(
        &self,
        type_ids: &[i32],
        region_id: i32,
    ) -> Result<HistoryBatchReport, SyncError> {
        let requested: BTreeSet<i32> = type_ids.iter().copied().collect();
        let mut stale = Vec::new();
        for &type_id in &requested {
            let key = DatasetKey::history(type_id, region_id);
            if self
                .scheduler
                .out_of_interval(&key, self.settings.history_interval)
                .await?
            {
                stale.push(type_id);
            }
        }
        if stale.is_empty() {
            return Ok(HistoryBatchReport {
                region_id,
                requested: requested.len(),
                ..HistoryBatchReport::default()
            });
        }

        let label = format!("history_batch:{region_id}");
        self.publish(SyncEvent::RefreshStarted {
            dataset: label.clone(),
            timestamp: Utc::now(),
        });
        match self.ingest_history(&stale, region_id, &label).await {
            Ok(mut report) => {
                report.requested = requested.len();
                self.publish(SyncEvent::RefreshCompleted {
                    dataset: label,
                    records: report.inserted,
                    failures: report.failed.len(),
                    timestamp: Utc::now(),
                });
                Ok(report)
            }
            Err(err) => {
                self.publish_failed(&label, &err);
                Err(err)
            }
        }
    }

    async fn ingest_history(
        &self,
        type_ids: &[i32],
        region_id: i32,
        dataset: &str,
    ) -> Result<HistoryBatchReport, SyncError> {
        let outcome = self
            .orchestrator
            .run(
                type_ids.iter().copied(),
                |type_id| {
                    let source = Arc::clone(&self.source);
                    async move { source.fetch_history(region_id, type_id).await }
                },
                |progress| self.publish_progress(dataset, progress),
            )
            .await;

        let mut report = HistoryBatchReport {
            region_id,
            requested: type_ids.len(),
            stale: type_ids.to_vec(),
            failed: outcome.failures.iter().map(|f| f.key).collect(),
            ..HistoryBatchReport::default()
        };
        for (type_id, rows) in outcome.successes {
            report.inserted += self.store.insert_history(&rows).await?;
            self.scheduler
                .mark_refreshed(&DatasetKey::history(type_id, region_id))
                .await?;
            self.cache.invalidate_history(type_id, region_id);
            report.ingested.push(type_id);
        }
        report.ingested.sort_unstable();
        report.failed.sort_unstable();

        tracing::info!(
            region_id,
            ingested = report.ingested.len(),
            failed = report.failed.len(),
            inserted = report.inserted,
            "history ingested"
        );
        Ok(report)
    }

    // ── Reads ────────────────────────────────────────────────────────────

    /// Best bid and ask for `type_id` at a venue (default: the first one),
    /// served from the hot-path cache or the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownVenue`] or [`SyncError::Persistence`].
    pub async fn latest_quote(&self, type_id: i32, venue: Option<&str>) -> Result<Quote, SyncError> {
        let location_id = self.venue(venue)?.location_id;
        self.cache
            .quote(location_id, type_id, || self.store.best_quote(location_id, type_id))
            .await
    }

    /// Best `limit` buy and sell orders for `type_id` at a venue.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownVenue`] or [`SyncError::Persistence`].
    pub async fn top_orders(
        &self,
        type_id: i32,
        venue: Option<&str>,
        limit: u32,
    ) -> Result<OrderBookTop, SyncError> {
        let location_id = self.venue(venue)?.location_id;
        self.store.top_orders(location_id, type_id, limit).await
    }

    /// Snapshot counts for every configured venue.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if a count fails.
    pub async fn venue_summaries(&self) -> Result<Vec<VenueStatus>, SyncError> {
        let mut statuses = Vec::with_capacity(self.settings.venues.len());
        for venue in &self.settings.venues {
            statuses.push(self.venue_status(venue).await?);
        }
        Ok(statuses)
    }

    async fn cached_history(
        &self,
        type_id: i32,
        region_id: i32,
    ) -> Result<Arc<Vec<HistoryRecord>>, SyncError> {
        self.cache
            .history(type_id, region_id, || async {
                let rows = self
                    .store
                    .history(type_id, region_id, HistoryOrder::Desc, None)
                    .await?;
                Ok(Arc::new(rows))
            })
            .await
    }

    /// Stored daily history of `type_id` in `region_id` in the requested
    /// date order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if the read fails.
    pub async fn history(
        &self,
        type_id: i32,
        region_id: i32,
        order: HistoryOrder,
    ) -> Result<Vec<HistoryRecord>, SyncError> {
        let newest_first = self.cached_history(type_id, region_id).await?;
        let mut rows = newest_first.as_ref().clone();
        if order == HistoryOrder::Asc {
            rows.reverse();
        }
        Ok(rows)
    }

    /// Refreshes the stale ids of a batch, then returns every requested
    /// series.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] on store failure.
    pub async fn history_batch(
        &self,
        type_ids: &[i32],
        region_id: i32,
        order: HistoryOrder,
    ) -> Result<(HistoryBatchReport, Vec<HistorySeries>), SyncError> {
        let report = self.refresh_history_batch(type_ids, region_id).await?;
        let ids: BTreeSet<i32> = type_ids.iter().copied().collect();
        let mut series = Vec::with_capacity(ids.len());
        for type_id in ids {
            series.push(HistorySeries {
                type_id,
                region_id,
                records: self.history(type_id, region_id, order).await?,
            });
        }
        Ok((report, series))
    }

    /// Week, month and year statistics of `type_id` in each region.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if a history read fails.
    pub async fn history_stats(
        &self,
        type_id: i32,
        region_ids: &[i32],
    ) -> Result<Vec<RegionHistoryStats>, SyncError> {
        let today = Utc::now().date_naive();
        let mut out = Vec::with_capacity(region_ids.len());
        for &region_id in region_ids {
            let rows = self.cached_history(type_id, region_id).await?;
            out.push(RegionHistoryStats {
                type_id,
                region_id,
                stats: HistoryStats::compute(&rows, today),
            });
        }
        Ok(out)
    }
}
