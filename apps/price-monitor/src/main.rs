//! Price Monitor Binary
//!
//! Starts the Binance and Backpack feeds, the supervised Lighter scraper,
//! the snapshot recorder and the health server.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p price-monitor --features chromium
//! ```
//!
//! # Environment Variables
//!
//! All optional.
//! - `BINANCE_SYMBOL` / `BACKPACK_SYMBOL`: Markets (default: BTCUSDC / `BTC_USDC_PERP`)
//! - `LIGHTER_URL`: Lighter market page (default: <https://app.lighter.xyz/trade/BTC>)
//! - `LIGHTER_SCRAPE_INTERVAL_MS`: Poll period (default: 1000)
//! - `LIGHTER_REFRESH_INTERVAL_SECS`: Soft refresh period (default: 300)
//! - `LIGHTER_RETRY_INTERVAL_SECS`: Background retry period (default: 30)
//! - `BROWSER_PATH`: Chrome/Chromium executable (default: auto-detect)
//! - `BROWSER_HEADLESS`: Run without a window (default: true)
//! - `BROWSER_CLOSE_TIMEOUT_SECS`: Graceful browser exit before kill (default: 10)
//! - `FEED_RECONNECT_DELAY_SECS`: Exchange reconnect delay (default: 5)
//! - `RECORD_INTERVAL_SECS`: Snapshot record period (default: 60)
//! - `HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: price_monitor=info, dependencies at warn)
//! - `LOG_FORMAT`: `json` for JSON lines (default: text)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use price_monitor::application::ports::{UpdateFanout, UpdateSink};
use price_monitor::application::services::{
    ConnectionSupervisor, DomBookScraper, PriceAggregator, SnapshotRecorder,
};
use price_monitor::infrastructure::broadcast::UpdateHub;
use price_monitor::infrastructure::browser::ChromiumSessionFactory;
use price_monitor::infrastructure::config::MonitorConfig;
use price_monitor::infrastructure::exchange::{FeedClient, Venue};
use price_monitor::infrastructure::health::{HealthServer, HealthServerState};
use price_monitor::infrastructure::store::InMemoryTimeSeriesStore;
use price_monitor::infrastructure::telemetry;
use price_monitor::init_metrics;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting price monitor");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = MonitorConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Update fan-out: aggregator for the snapshot, hub for async subscribers
    let aggregator = Arc::new(PriceAggregator::new());
    let hub = Arc::new(UpdateHub::with_defaults());
    let sink: Arc<dyn UpdateSink> = Arc::new(
        UpdateFanout::new()
            .with(Arc::clone(&aggregator) as Arc<dyn UpdateSink>)
            .with(Arc::clone(&hub) as Arc<dyn UpdateSink>),
    );

    // Exchange feeds
    let feed_config = config.feeds.feed_config();
    let binance = Arc::new(FeedClient::new(
        config.feeds.binance(),
        feed_config.clone(),
        Arc::clone(&sink),
        shutdown_token.child_token(),
    ));
    let backpack = Arc::new(FeedClient::new(
        config.feeds.backpack(),
        feed_config,
        Arc::clone(&sink),
        shutdown_token.child_token(),
    ));

    // Lighter supervisor
    let supervisor = Arc::new(ConnectionSupervisor::new(
        config.supervisor.clone(),
        Arc::new(ChromiumSessionFactory::new(config.browser.clone())),
        Arc::new(DomBookScraper::new(config.scraper.clone())),
        Arc::clone(&sink),
        shutdown_token.child_token(),
    ));

    // Snapshot history
    let store = Arc::new(InMemoryTimeSeriesStore::new(config.recorder.history_capacity));
    let recorder = SnapshotRecorder::new(
        Arc::clone(&aggregator),
        store,
        config.recorder.interval,
        shutdown_token.child_token(),
    );

    // Health server
    let health_state = Arc::new(
        HealthServerState::new(env!("CARGO_PKG_VERSION").to_string(), Arc::clone(&aggregator))
            .with_feed(binance.source(), binance.status())
            .with_feed(backpack.source(), backpack.status())
            .with_supervisor(Arc::clone(&supervisor))
            .with_hub(Arc::clone(&hub)),
    );
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    tasks.push(spawn_feed(binance));
    tasks.push(spawn_feed(backpack));

    let supervisor_task = Arc::clone(&supervisor);
    tasks.push(tokio::spawn(async move {
        if let Err(e) = supervisor_task.run().await {
            tracing::error!(error = %e, "Connection supervisor error");
        }
    }));

    tasks.push(tokio::spawn(async move {
        recorder.run().await;
    }));

    tasks.push(tokio::spawn(log_lighter_availability(
        Arc::clone(&hub),
        shutdown_token.clone(),
    )));

    tasks.push(tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    }));

    tracing::info!("Price monitor ready");

    await_shutdown(shutdown_token).await;

    supervisor.stop().await;

    let drain = futures_util::future::join_all(tasks);
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Tasks did not finish before shutdown timeout"
        );
    }

    tracing::info!("Price monitor stopped");
    Ok(())
}

/// Run one exchange feed until cancelled.
fn spawn_feed<V: Venue>(client: Arc<FeedClient<V>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = client.run().await {
            tracing::error!(source = %client.source(), error = %e, "Feed client error");
        }
    })
}

/// Surface Lighter availability changes observed on the update hub.
async fn log_lighter_availability(hub: Arc<UpdateHub>, shutdown: CancellationToken) {
    let mut rx = hub.connection_rx();
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            change = rx.recv() => match change {
                Ok(change) if change.connected => {
                    tracing::info!(at = %change.at, "Lighter order book available");
                }
                Ok(change) => {
                    tracing::warn!(at = %change.at, "Lighter order book unavailable");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Availability log lagged");
                }
                Err(RecvError::Closed) => return,
            }
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &MonitorConfig) {
    tracing::info!(
        binance_symbol = %config.feeds.binance_symbol,
        backpack_symbol = %config.feeds.backpack_symbol,
        lighter_url = %config.supervisor.url,
        headless = config.browser.headless,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        scrape_interval_ms = config.supervisor.scrape_interval.as_millis(),
        refresh_interval_secs = config.supervisor.refresh_interval.as_secs(),
        retry_interval_secs = config.supervisor.background_retry_interval.as_secs(),
        degrade_threshold = config.supervisor.degrade_threshold,
        reconnect_threshold = config.supervisor.reconnect_threshold,
        record_interval_secs = config.recorder.interval.as_secs(),
        "Supervisor settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
