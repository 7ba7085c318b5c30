//! Price Aggregator
//!
//! Latest-value store fed by every source. Writers replace the stored value
//! for their source; readers get an owned [`AggregatedSnapshot`] built under
//! the same lock, so a snapshot never mixes an old and a new field of one
//! source.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::application::ports::UpdateSink;
use crate::domain::market::{
    AggregatedSnapshot, OrderBook, Quote, ReceivedAt, Source, SourceUpdate,
};

#[derive(Debug, Default)]
struct Latest {
    binance: Option<Quote>,
    backpack: Option<Quote>,
    lighter_book: Option<OrderBook>,
    lighter_connected: bool,
    received_at: ReceivedAt,
    last_update: Option<DateTime<Utc>>,
}

/// Thread-safe latest-value store across all sources.
#[derive(Debug, Default)]
pub struct PriceAggregator {
    latest: Mutex<Latest>,
}

impl PriceAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new value for its source, replacing the previous one.
    pub fn update(&self, update: SourceUpdate) {
        let now = Utc::now();
        let mut latest = self.latest.lock();
        match update {
            SourceUpdate::Quote(quote) => {
                let source = quote.source;
                match source {
                    Source::Binance => latest.binance = Some(quote),
                    Source::Backpack => latest.backpack = Some(quote),
                    Source::Lighter => {
                        tracing::warn!(price = %quote.price, "Ignoring quote tagged as lighter");
                        return;
                    }
                }
                latest.received_at.set(source, now);
            }
            SourceUpdate::OrderBook(book) => {
                latest.lighter_book = Some(book);
                latest.received_at.set(Source::Lighter, now);
            }
            SourceUpdate::LighterConnection { connected, .. } => {
                latest.lighter_connected = connected;
            }
        }
        latest.last_update = Some(now);
    }

    /// Owned copy of the current state.
    #[must_use]
    pub fn read(&self) -> AggregatedSnapshot {
        let latest = self.latest.lock();
        AggregatedSnapshot {
            binance: latest.binance.clone(),
            backpack: latest.backpack.clone(),
            lighter_book: latest.lighter_book.clone(),
            lighter_connected: latest.lighter_connected,
            received_at: latest.received_at,
            as_of: Utc::now(),
        }
    }

    /// When any value was last stored.
    #[must_use]
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.latest.lock().last_update
    }

    /// Whether at least one source has delivered data.
    #[must_use]
    pub fn has_data(&self) -> bool {
        let latest = self.latest.lock();
        latest.binance.is_some() || latest.backpack.is_some() || latest.lighter_book.is_some()
    }
}

impl UpdateSink for PriceAggregator {
    fn on_update(&self, update: SourceUpdate) {
        self.update(update);
    }
}
