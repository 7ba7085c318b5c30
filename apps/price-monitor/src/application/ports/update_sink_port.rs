//! Update Sink Port
//!
//! Observer interface through which feeds and the supervisor publish new
//! values. Calls happen on the producer's task and must return quickly:
//! store, forward to a channel, never perform I/O.

use std::sync::Arc;

use crate::domain::market::SourceUpdate;

/// Receiver of source updates.
pub trait UpdateSink: Send + Sync {
    /// Handle one update. Must not block.
    fn on_update(&self, update: SourceUpdate);
}

/// Forwards every update to an ordered list of sinks.
#[derive(Clone, Default)]
pub struct UpdateFanout {
    sinks: Vec<Arc<dyn UpdateSink>>,
}

impl UpdateFanout {
    /// Create an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink, builder style.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn UpdateSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Add a sink.
    pub fn push(&mut self, sink: Arc<dyn UpdateSink>) {
        self.sinks.push(sink);
    }

    /// Number of attached sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sink is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for UpdateFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateFanout")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl UpdateSink for UpdateFanout {
    fn on_update(&self, update: SourceUpdate) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.on_update(update.clone());
            }
            last.on_update(update);
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpUpdateSink;

impl UpdateSink for NoOpUpdateSink {
    fn on_update(&self, _update: SourceUpdate) {}
}
