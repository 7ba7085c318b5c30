//! Snapshot Recorder
//!
//! Writes the aggregated snapshot to the time series store on a fixed
//! cadence. Snapshots with no price at all are skipped so history does not
//! fill with empty rows while the sources are still starting.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::aggregator::PriceAggregator;
use crate::application::ports::{SnapshotRecord, StoreError, TimeSeriesStore};
use crate::infrastructure::metrics;

/// Periodic snapshot writer.
pub struct SnapshotRecorder {
    aggregator: Arc<PriceAggregator>,
    store: Arc<dyn TimeSeriesStore>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl SnapshotRecorder {
    /// Default recording cadence.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

    /// Create a recorder.
    #[must_use]
    pub fn new(
        aggregator: Arc<PriceAggregator>,
        store: Arc<dyn TimeSeriesStore>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            aggregator,
            store,
            interval,
            shutdown,
        }
    }

    /// Record until shutdown. The first record is taken one interval after
    /// start.
    pub async fn run(&self) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval = ?self.interval, "Starting snapshot recorder");

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    tracing::info!("Snapshot recorder shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.record_once().await {
                        tracing::warn!(error = %e, "Failed to record snapshot");
                    }
                }
            }
        }
    }

    /// Record the current snapshot now.
    ///
    /// Returns whether a row was written.
    ///
    /// # Errors
    ///
    /// Returns the store's error when the write fails.
    pub async fn record_once(&self) -> Result<bool, StoreError> {
        let snapshot = self.aggregator.read();
        let record = SnapshotRecord::from_snapshot(&snapshot);
        if !record.has_any_price() {
            tracing::debug!("No prices yet, skipping snapshot");
            return Ok(false);
        }

        self.store.record_snapshot(&snapshot).await?;
        metrics::record_snapshot_recorded();
        tracing::debug!(
            binance = ?record.binance,
            backpack = ?record.backpack,
            lighter_mid = ?record.lighter_mid,
            "Recorded snapshot"
        );
        Ok(true)
    }
}
