//! Bounded in-memory snapshot history.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::application::ports::{SnapshotRecord, StoreError, TimeSeriesStore};
use crate::domain::market::AggregatedSnapshot;

/// In-memory implementation of `TimeSeriesStore`.
///
/// Keeps at most `capacity` records; the oldest is evicted first. Records
/// are kept in arrival order, which is also time order because the recorder
/// stamps them with the snapshot time.
#[derive(Debug)]
pub struct InMemoryTimeSeriesStore {
    records: RwLock<VecDeque<SnapshotRecord>>,
    capacity: usize,
}

impl InMemoryTimeSeriesStore {
    /// Create an empty store holding up to `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity.min(4_096))),
            capacity,
        }
    }

    /// Maximum number of records kept.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Append a record directly (for test setup and backfill).
    pub fn push(&self, record: SnapshotRecord) {
        let mut records = self.records.write();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Remove all records.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

#[async_trait]
impl TimeSeriesStore for InMemoryTimeSeriesStore {
    async fn record_snapshot(&self, snapshot: &AggregatedSnapshot) -> Result<(), StoreError> {
        self.push(SnapshotRecord::from_snapshot(snapshot));
        Ok(())
    }

    async fn latest(&self, count: usize) -> Result<Vec<SnapshotRecord>, StoreError> {
        let records = self.records.read();
        let skip = records.len().saturating_sub(count);
        Ok(records.iter().skip(skip).cloned().collect())
    }

    async fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SnapshotRecord>, StoreError> {
        if start > end {
            return Err(StoreError::QueryFailed {
                message: format!("range start {start} is after end {end}"),
            });
        }
        let records = self.records.read();
        Ok(records
            .iter()
            .filter(|r| r.recorded_at >= start && r.recorded_at <= end)
            .cloned()
            .collect())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().len())
    }
}
