//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Updates**: Values accepted per source
//! - **Feeds**: Parse errors, reconnects and connection gauges per exchange
//! - **Scraper**: Scrape failures by kind and scrape duration
//! - **Supervisor**: Connection state gauge, transitions, sessions created
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder, so
//! tests never need to set anything up.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionState;
use crate::domain::market::Source;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "price_monitor_updates_total",
        "Total values accepted per source"
    );

    describe_gauge!(
        "price_monitor_feed_connected",
        "Whether the exchange WebSocket is connected (1) or not (0)"
    );
    describe_counter!(
        "price_monitor_feed_parse_errors_total",
        "Total exchange messages that could not be parsed"
    );
    describe_counter!(
        "price_monitor_feed_reconnects_total",
        "Total exchange WebSocket reconnection attempts"
    );

    describe_counter!(
        "price_monitor_scrape_failures_total",
        "Total failed order book scrapes by kind"
    );
    describe_histogram!(
        "price_monitor_scrape_duration_seconds",
        "Time to scrape one order book"
    );

    describe_gauge!(
        "price_monitor_connection_state",
        "Render session state (0=disconnected 1=connecting 2=connected 3=degraded 4=refreshing 5=reconnecting 6=stopped)"
    );
    describe_counter!(
        "price_monitor_state_transitions_total",
        "Total render session state transitions by target state"
    );
    describe_counter!(
        "price_monitor_sessions_created_total",
        "Total render sessions created"
    );

    describe_counter!(
        "price_monitor_snapshots_recorded_total",
        "Total aggregated snapshots written to the time series store"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a value accepted from a source.
pub fn record_update(source: Source) {
    counter!("price_monitor_updates_total", "source" => source.as_str()).increment(1);
}

/// Update the connection gauge of an exchange feed.
pub fn set_feed_connected(source: Source, connected: bool) {
    gauge!("price_monitor_feed_connected", "source" => source.as_str())
        .set(if connected { 1.0 } else { 0.0 });
}

/// Record an unparseable exchange message.
pub fn record_parse_error(source: Source) {
    counter!("price_monitor_feed_parse_errors_total", "source" => source.as_str()).increment(1);
}

/// Record an exchange reconnection attempt.
pub fn record_feed_reconnect(source: Source) {
    counter!("price_monitor_feed_reconnects_total", "source" => source.as_str()).increment(1);
}

/// Record a failed scrape.
pub fn record_scrape_failure(kind: &'static str) {
    counter!("price_monitor_scrape_failures_total", "kind" => kind).increment(1);
}

/// Record how long one scrape took.
pub fn record_scrape_duration(duration: Duration) {
    histogram!("price_monitor_scrape_duration_seconds").record(duration.as_secs_f64());
}

/// Record a render session state transition.
pub fn record_state_transition(to: ConnectionState) {
    gauge!("price_monitor_connection_state").set(f64::from(to.code()));
    counter!("price_monitor_state_transitions_total", "to" => to.as_str()).increment(1);
}

/// Record a newly created render session.
pub fn record_session_created() {
    counter!("price_monitor_sessions_created_total").increment(1);
}

/// Record a snapshot written to history.
pub fn record_snapshot_recorded() {
    counter!("price_monitor_snapshots_recorded_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_values_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_update(Source::Binance);
            record_update(Source::Binance);
            set_feed_connected(Source::Backpack, true);
            record_scrape_failure("crossed_book");
            record_state_transition(ConnectionState::Degraded);
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"price_monitor_updates_total{source="binance"} 2"#));
        assert!(rendered.contains(r#"price_monitor_feed_connected{source="backpack"}"#));
        assert!(rendered.contains(r#"price_monitor_scrape_failures_total{kind="crossed_book"} 1"#));
        assert!(rendered.contains("price_monitor_connection_state"));
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_update(Source::Lighter);
        record_scrape_duration(Duration::from_millis(5));
        record_session_created();
    }
}
