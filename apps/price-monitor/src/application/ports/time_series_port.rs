//! Time Series Port (Driven Port)
//!
//! Consumer of periodic aggregated snapshots with simple history queries.
//! The storage encoding is up to the adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::AggregatedSnapshot;

/// One recorded row of history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// When the row was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Binance price, if available at record time.
    pub binance: Option<Decimal>,
    /// Backpack price, if available at record time.
    pub backpack: Option<Decimal>,
    /// Lighter mid price, if available at record time.
    pub lighter_mid: Option<Decimal>,
}

impl SnapshotRecord {
    /// Project a snapshot into a history row.
    #[must_use]
    pub fn from_snapshot(snapshot: &AggregatedSnapshot) -> Self {
        Self {
            recorded_at: snapshot.as_of,
            binance: snapshot.binance.as_ref().map(|q| q.price),
            backpack: snapshot.backpack.as_ref().map(|q| q.price),
            lighter_mid: snapshot.lighter_mid_price(),
        }
    }

    /// Whether at least one price is present.
    #[must_use]
    pub const fn has_any_price(&self) -> bool {
        self.binance.is_some() || self.backpack.is_some() || self.lighter_mid.is_some()
    }
}

/// Time series store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Write failed.
    #[error("Failed to record snapshot: {message}")]
    WriteFailed {
        /// Error details.
        message: String,
    },

    /// Query failed.
    #[error("History query failed: {message}")]
    QueryFailed {
        /// Error details.
        message: String,
    },
}

/// Port for snapshot history.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Append a snapshot.
    async fn record_snapshot(&self, snapshot: &AggregatedSnapshot) -> Result<(), StoreError>;

    /// Most recent `count` records, oldest first.
    async fn latest(&self, count: usize) -> Result<Vec<SnapshotRecord>, StoreError>;

    /// Records with `start <= recorded_at <= end`, oldest first.
    async fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SnapshotRecord>, StoreError>;

    /// Number of stored records.
    async fn len(&self) -> Result<usize, StoreError>;
}
