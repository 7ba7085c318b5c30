//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, source status reporting, and Prometheus
//! metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (at least one source has data)
//! - `GET /metrics` - Prometheus metrics in text format

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{ConnectionSupervisor, PriceAggregator, SupervisorStatus};
use crate::domain::connection::ConnectionState;
use crate::domain::market::Source;
use crate::infrastructure::broadcast::SharedUpdateHub;
use crate::infrastructure::exchange::{FeedStatus, FeedStatusSnapshot};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Monitor version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Exchange feed status by source name.
    pub feeds: BTreeMap<&'static str, FeedStatusSnapshot>,
    /// Lighter session status, when supervised.
    pub lighter: Option<SupervisorStatus>,
    /// Age of the latest value per source in milliseconds; `null` when no
    /// value has arrived yet.
    pub data_age_ms: BTreeMap<&'static str, Option<i64>>,
    /// Active update hub subscribers.
    pub subscribers: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every source is up.
    Healthy,
    /// Some sources are down or the Lighter session is degraded.
    Degraded,
    /// No source is up.
    Unhealthy,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    aggregator: Arc<PriceAggregator>,
    feeds: Vec<(Source, Arc<FeedStatus>)>,
    supervisor: Option<Arc<ConnectionSupervisor>>,
    hub: Option<SharedUpdateHub>,
}

impl HealthServerState {
    /// Create state reporting on `aggregator` only.
    #[must_use]
    pub fn new(version: String, aggregator: Arc<PriceAggregator>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            aggregator,
            feeds: Vec::new(),
            supervisor: None,
            hub: None,
        }
    }

    /// Report on an exchange feed.
    #[must_use]
    pub fn with_feed(mut self, source: Source, status: Arc<FeedStatus>) -> Self {
        self.feeds.push((source, status));
        self
    }

    /// Report on the Lighter supervisor.
    #[must_use]
    pub fn with_supervisor(mut self, supervisor: Arc<ConnectionSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Report hub subscriber counts.
    #[must_use]
    pub fn with_hub(mut self, hub: SharedUpdateHub) -> Self {
        self.hub = Some(hub);
        self
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Routes served by [`HealthServer`].
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.aggregator.has_data() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let now = Utc::now();
    let snapshot = state.aggregator.read();

    let feeds: BTreeMap<_, _> = state
        .feeds
        .iter()
        .map(|(source, status)| (source.as_str(), status.snapshot()))
        .collect();

    let lighter = state.supervisor.as_ref().map(|s| s.status());

    let data_age_ms = Source::all()
        .iter()
        .map(|&source| {
            let age = snapshot
                .age_of(source, now)
                .map(|d| d.num_milliseconds().max(0));
            (source.as_str(), age)
        })
        .collect();

    let feeds_up: Vec<bool> = feeds.values().map(|f| f.connected).collect();
    let status = determine_health_status(&feeds_up, lighter.as_ref().map(|l| l.state));

    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: now,
        feeds,
        lighter,
        data_age_ms,
        subscribers: state
            .hub
            .as_ref()
            .map_or(0, |hub| hub.stats().total_receivers()),
    }
}

fn determine_health_status(feeds_up: &[bool], lighter: Option<ConnectionState>) -> HealthStatus {
    let lighter_up = lighter.map(ConnectionState::is_serving);
    let total = feeds_up.len() + usize::from(lighter_up.is_some());
    let up = feeds_up.iter().filter(|&&c| c).count() + usize::from(lighter_up == Some(true));

    if up == 0 {
        return HealthStatus::Unhealthy;
    }
    if up < total || lighter == Some(ConnectionState::Degraded) {
        return HealthStatus::Degraded;
    }
    HealthStatus::Healthy
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use rust_decimal_macros::dec;
    use test_case::test_case;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::market::{Quote, SourceUpdate};

    fn state(aggregator: Arc<PriceAggregator>) -> Arc<HealthServerState> {
        Arc::new(
            HealthServerState::new("0.0.0-test".to_string(), aggregator)
                .with_feed(Source::Binance, Arc::new(FeedStatus::default()))
                .with_feed(Source::Backpack, Arc::new(FeedStatus::default())),
        )
    }

    async fn get_path(app: Router, path: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test_case(&[true, true], Some(ConnectionState::Connected), HealthStatus::Healthy; "all up")]
    #[test_case(&[true, true], Some(ConnectionState::Degraded), HealthStatus::Degraded; "lighter degraded")]
    #[test_case(&[true, false], Some(ConnectionState::Connected), HealthStatus::Degraded; "one feed down")]
    #[test_case(&[false, false], Some(ConnectionState::Reconnecting), HealthStatus::Unhealthy; "nothing up")]
    #[test_case(&[true, true], None, HealthStatus::Healthy; "feeds only")]
    #[test_case(&[], None, HealthStatus::Unhealthy; "no sources")]
    fn determine_status(feeds: &[bool], lighter: Option<ConnectionState>, expected: HealthStatus) {
        assert_eq!(determine_health_status(feeds, lighter), expected);
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let app = router(state(Arc::new(PriceAggregator::new())));
        let (status, body) = get_path(app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn readiness_follows_data_arrival() {
        let aggregator = Arc::new(PriceAggregator::new());
        let app = router(state(Arc::clone(&aggregator)));

        let (status, _) = get_path(app.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        aggregator.update(SourceUpdate::Quote(Quote::new(
            Source::Binance,
            dec!(67000.5),
            Utc::now(),
        )));

        let (status, body) = get_path(app, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "READY");
    }

    #[tokio::test]
    async fn health_reports_feeds_and_ages() {
        let aggregator = Arc::new(PriceAggregator::new());
        aggregator.update(SourceUpdate::Quote(Quote::new(
            Source::Backpack,
            dec!(66990),
            Utc::now(),
        )));
        let app = router(state(aggregator));

        let (status, body) = get_path(app, "/health").await;
        // Both feeds report disconnected and there is no supervisor.
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["feeds"]["binance"]["connected"], false);
        assert!(json["data_age_ms"]["backpack"].is_i64());
        assert!(json["data_age_ms"]["binance"].is_null());
        assert!(json["lighter"].is_null());
    }

    #[tokio::test]
    async fn data_age_ignores_venue_clock_skew() {
        let aggregator = Arc::new(PriceAggregator::new());
        aggregator.update(SourceUpdate::Quote(Quote::new(
            Source::Binance,
            dec!(67000),
            Utc::now() - chrono::Duration::minutes(10),
        )));
        let app = router(state(aggregator));

        let (_, body) = get_path(app, "/health").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        let age = json["data_age_ms"]["binance"].as_i64().unwrap();
        assert!(age < 5_000, "age {age}ms reflects the venue timestamp");
    }
}
