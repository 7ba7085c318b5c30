//! Update Broadcast Hub
//!
//! Fans source updates out to any number of async subscribers over tokio
//! broadcast channels. The hub is an [`UpdateSink`], so it sits next to the
//! aggregator in the update fan-out without producers knowing about it.
//!
//! # Architecture
//!
//! One channel per update kind:
//! - Exchange quotes from Binance and Backpack
//! - Scraped Lighter order books
//! - Lighter connection changes
//!
//! A subscriber that falls behind loses the oldest messages
//! (`RecvError::Lagged`); producers are never slowed down.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::application::ports::UpdateSink;
use crate::domain::market::{OrderBook, Quote, SourceUpdate};

/// Lighter connection change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionChange {
    /// Whether the Lighter session is serving.
    pub connected: bool,
    /// When it changed.
    pub at: DateTime<Utc>,
}

// =============================================================================
// Update Hub
// =============================================================================

/// Channel capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Capacity of the quote channel.
    pub quotes_capacity: usize,
    /// Capacity of the order book channel.
    pub books_capacity: usize,
    /// Capacity of the connection channel.
    pub connection_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            quotes_capacity: 1_024,
            books_capacity: 64,
            connection_capacity: 16,
        }
    }
}

/// Central hub for update channels.
///
/// # Example
///
/// ```rust
/// use price_monitor::infrastructure::broadcast::UpdateHub;
///
/// let hub = UpdateHub::with_defaults();
/// let mut quotes = hub.quotes_rx();
/// assert_eq!(hub.stats().total_receivers(), 1);
/// # drop(quotes.try_recv());
/// ```
#[derive(Debug)]
#[allow(clippy::struct_field_names)]
pub struct UpdateHub {
    quotes_tx: broadcast::Sender<Quote>,
    books_tx: broadcast::Sender<OrderBook>,
    connection_tx: broadcast::Sender<ConnectionChange>,
}

impl UpdateHub {
    /// Create a hub with the given capacities.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            quotes_tx: broadcast::channel(config.quotes_capacity).0,
            books_tx: broadcast::channel(config.books_capacity).0,
            connection_tx: broadcast::channel(config.connection_capacity).0,
        }
    }

    /// Create a hub with default capacities.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BroadcastConfig::default())
    }

    /// Route one update to its channel.
    ///
    /// Returns the number of receivers reached, or `None` if the channel
    /// had none.
    pub fn publish(&self, update: SourceUpdate) -> Option<usize> {
        match update {
            SourceUpdate::Quote(quote) => self.quotes_tx.send(quote).ok(),
            SourceUpdate::OrderBook(book) => self.books_tx.send(book).ok(),
            SourceUpdate::LighterConnection { connected, at } => self
                .connection_tx
                .send(ConnectionChange { connected, at })
                .ok(),
        }
    }

    /// New receiver for exchange quotes.
    #[must_use]
    pub fn quotes_rx(&self) -> broadcast::Receiver<Quote> {
        self.quotes_tx.subscribe()
    }

    /// New receiver for Lighter order books.
    #[must_use]
    pub fn books_rx(&self) -> broadcast::Receiver<OrderBook> {
        self.books_tx.subscribe()
    }

    /// New receiver for Lighter connection changes.
    #[must_use]
    pub fn connection_rx(&self) -> broadcast::Receiver<ConnectionChange> {
        self.connection_tx.subscribe()
    }

    /// Receiver counts of all channels.
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            quotes_receivers: self.quotes_tx.receiver_count(),
            books_receivers: self.books_tx.receiver_count(),
            connection_receivers: self.connection_tx.receiver_count(),
        }
    }
}

impl UpdateSink for UpdateHub {
    fn on_update(&self, update: SourceUpdate) {
        let _ = self.publish(update);
    }
}

/// Shared hub reference.
pub type SharedUpdateHub = Arc<UpdateHub>;

/// Receiver counts per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Quote receivers.
    pub quotes_receivers: usize,
    /// Order book receivers.
    pub books_receivers: usize,
    /// Connection change receivers.
    pub connection_receivers: usize,
}

impl BroadcastStats {
    /// Total receivers across all channels.
    #[must_use]
    pub const fn total_receivers(&self) -> usize {
        self.quotes_receivers + self.books_receivers + self.connection_receivers
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    use super::*;
    use crate::domain::market::{OrderBookLevel, Side, Source};

    fn quote(price: rust_decimal::Decimal) -> Quote {
        Quote::new(Source::Binance, price, Utc::now())
    }

    fn book() -> OrderBook {
        OrderBook::new(
            vec![OrderBookLevel::new(Side::Ask, dec!(101), dec!(1), dec!(1))],
            vec![OrderBookLevel::new(Side::Bid, dec!(99), dec!(2), dec!(2))],
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn receiver_counts_track_subscriptions() {
        let hub = UpdateHub::with_defaults();
        assert_eq!(hub.stats().total_receivers(), 0);

        let _q = hub.quotes_rx();
        {
            let _b = hub.books_rx();
            assert_eq!(hub.stats().books_receivers, 1);
        }
        let _c = hub.connection_rx();

        let stats = hub.stats();
        assert_eq!(stats.quotes_receivers, 1);
        assert_eq!(stats.books_receivers, 0);
        assert_eq!(stats.total_receivers(), 2);
    }

    #[tokio::test]
    async fn updates_are_routed_by_kind() {
        let hub = UpdateHub::with_defaults();
        let mut quotes = hub.quotes_rx();
        let mut books = hub.books_rx();
        let mut connection = hub.connection_rx();

        hub.on_update(SourceUpdate::Quote(quote(dec!(67000))));
        hub.on_update(SourceUpdate::OrderBook(book()));
        hub.on_update(SourceUpdate::LighterConnection {
            connected: true,
            at: Utc::now(),
        });

        assert_eq!(quotes.recv().await.unwrap().price, dec!(67000));
        assert_eq!(books.recv().await.unwrap().mid_price(), dec!(100));
        assert!(connection.recv().await.unwrap().connected);
        assert_eq!(quotes.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[tokio::test]
    async fn every_subscriber_sees_each_quote() {
        let hub = UpdateHub::with_defaults();
        let mut rx1 = hub.quotes_rx();
        let mut rx2 = hub.quotes_rx();

        assert_eq!(hub.publish(SourceUpdate::Quote(quote(dec!(1)))), Some(2));

        assert_eq!(rx1.recv().await.unwrap().price, dec!(1));
        assert_eq!(rx2.recv().await.unwrap().price, dec!(1));
    }

    #[test]
    fn publish_without_receivers_returns_none() {
        let hub = UpdateHub::with_defaults();
        assert!(hub.publish(SourceUpdate::Quote(quote(dec!(1)))).is_none());
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let hub = UpdateHub::new(BroadcastConfig {
            quotes_capacity: 2,
            ..BroadcastConfig::default()
        });
        let mut rx = hub.quotes_rx();

        for i in 0..5 {
            hub.on_update(SourceUpdate::Quote(quote(rust_decimal::Decimal::from(i))));
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(rx.recv().await.unwrap().price, dec!(3));
        assert_eq!(rx.recv().await.unwrap().price, dec!(4));
    }
}
