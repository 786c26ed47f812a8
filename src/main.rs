//! market-sync-gateway server entry point.
//!
//! Wires the store, the remote client and the service together, starts the
//! optional background refresh loop and serves the Axum router.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use market_sync_gateway::api;
use market_sync_gateway::app_state::AppState;
use market_sync_gateway::cache::{CachePolicy, HotPathCache};
use market_sync_gateway::config::SyncConfig;
use market_sync_gateway::domain::{DatasetKey, EventBus};
use market_sync_gateway::persistence::{MarketStore, MemoryStore, PostgresStore};
use market_sync_gateway::remote::{EsiClient, FetchOrchestrator, MarketDataSource, RateLimiter};
use market_sync_gateway::service::{MarketService, ServiceSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Load configuration
    let config = SyncConfig::from_env().context("loading configuration")?;
    tracing::info!(
        addr = %config.listen_addr,
        venues = config.venues.len(),
        persistence = config.persistence_enabled,
        "starting market-sync-gateway"
    );

    // Storage
    let store: Arc<dyn MarketStore> = if config.persistence_enabled {
        let store = PostgresStore::connect(
            &config.database_url,
            config.database_max_connections,
            config.database_min_connections,
            Duration::from_secs(config.database_connect_timeout_secs),
        )
        .await
        .context("connecting to PostgreSQL")?;
        Arc::new(store)
    } else {
        tracing::warn!("persistence disabled, data is kept in memory only");
        Arc::new(MemoryStore::new())
    };

    // Remote source
    let source: Arc<dyn MarketDataSource> = Arc::new(EsiClient::new(
        &config.esi_base_url,
        &config.esi_user_agent,
        config.request_timeout(),
        config.esi_access_token.clone(),
    )?);
    let limiter = Arc::new(RateLimiter::new(config.esi_rate_per_minute, config.esi_max_tokens)?);
    let orchestrator = FetchOrchestrator::new(
        limiter,
        config.esi_max_concurrent,
        config.request_timeout(),
        config.batch_deadline(),
    );

    // Service layer
    let cache = HotPathCache::new(
        CachePolicy::new(
            Duration::from_secs(config.quote_cache_ttl_secs),
            config.hot_cache_max_entries,
        ),
        CachePolicy::new(
            Duration::from_secs(config.history_cache_ttl_secs),
            config.hot_cache_max_entries,
        ),
    );
    let market_service = Arc::new(MarketService::new(
        store,
        source,
        orchestrator,
        cache,
        EventBus::new(config.event_bus_capacity),
        ServiceSettings {
            venues: config.venues.clone(),
            order_interval: config.order_interval(),
            history_interval: config.history_interval(),
        },
    ));

    if let Some(period) = config.auto_refresh_interval() {
        spawn_auto_refresh(Arc::clone(&market_service), period);
    }

    // Build router
    let app = api::build_app(AppState::new(market_service));

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// `RUST_LOG` filter (default `info`); `LOG_FORMAT=json` for JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Refreshes all venues every `period`; failures are logged and retried on
/// the next tick.
fn spawn_auto_refresh(market_service: Arc<MarketService>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match market_service.refresh(&DatasetKey::MarketOrders, false).await {
                Ok(report) if report.refreshed => {
                    tracing::info!(records = report.records, "background refresh done");
                }
                Ok(_) => {}
                Err(err) => tracing::error!(error = %err, "background refresh failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
