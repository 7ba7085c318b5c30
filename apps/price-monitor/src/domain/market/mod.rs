//! Market Data Types
//!
//! Domain types for prices observed across the monitored sources: single
//! price quotes from exchange feeds, order book snapshots scraped from the
//! rendered Lighter page, and the combined snapshot handed to readers.
//!
//! # Design
//!
//! Values are replaced wholesale on every update; nothing here keeps
//! history. Derived figures (best bid/ask, mid, spread) are computed on read
//! from the stored levels so they can never drift from them.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Sources
// =============================================================================

/// A monitored price source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Binance USDⓈ-M futures ticker stream.
    Binance,
    /// Backpack perpetual ticker stream.
    Backpack,
    /// Lighter order book, scraped from the trading page.
    Lighter,
}

impl Source {
    /// All sources in display order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Binance, Self::Backpack, Self::Lighter]
    }

    /// Lowercase source name, used for log fields and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Backpack => "backpack",
            Self::Lighter => "lighter",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Quote
// =============================================================================

/// Latest price reported by a single source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Where the price came from.
    pub source: Source,
    /// Last traded / ticker price.
    pub price: Decimal,
    /// When the price was observed.
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    /// Create a new quote.
    #[must_use]
    pub const fn new(source: Source, price: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self {
            source,
            price,
            observed_at,
        }
    }
}

// =============================================================================
// Order Book
// =============================================================================

/// Order book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Resting buy interest.
    Bid,
    /// Resting sell interest.
    Ask,
}

impl Side {
    /// Lowercase side name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bid => "bid",
            Self::Ask => "ask",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One price level of an order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    /// Level price.
    pub price: Decimal,
    /// Size resting at this level.
    pub size: Decimal,
    /// Running total from the top of the book down to this level.
    pub cumulative_size: Decimal,
    /// Which side of the book the level belongs to.
    pub side: Side,
}

impl OrderBookLevel {
    /// Create a new level.
    #[must_use]
    pub const fn new(side: Side, price: Decimal, size: Decimal, cumulative_size: Decimal) -> Self {
        Self {
            price,
            size,
            cumulative_size,
            side,
        }
    }
}

/// Reasons an assembled order book is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderBookError {
    /// One side had no levels.
    #[error("order book {0} side is empty")]
    EmptySide(Side),

    /// Best bid is at or above best ask.
    #[error("order book is crossed: best bid {best_bid} >= best ask {best_ask}")]
    Crossed {
        /// Highest bid.
        best_bid: Decimal,
        /// Lowest ask.
        best_ask: Decimal,
    },
}

/// A validated order book snapshot.
///
/// Asks are ordered by ascending price, bids by descending price, and both
/// sides hold at least one level. The only way to build one is
/// [`OrderBook::new`], which enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBook {
    asks: Vec<OrderBookLevel>,
    bids: Vec<OrderBookLevel>,
    observed_at: DateTime<Utc>,
}

impl OrderBook {
    /// Assemble a book from unordered levels.
    ///
    /// # Errors
    ///
    /// Returns [`OrderBookError::EmptySide`] if either side has no levels and
    /// [`OrderBookError::Crossed`] if the best bid is not below the best ask.
    pub fn new(
        mut asks: Vec<OrderBookLevel>,
        mut bids: Vec<OrderBookLevel>,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, OrderBookError> {
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        bids.sort_by(|a, b| b.price.cmp(&a.price));

        let best_ask = asks.first().ok_or(OrderBookError::EmptySide(Side::Ask))?.price;
        let best_bid = bids.first().ok_or(OrderBookError::EmptySide(Side::Bid))?.price;

        if best_bid >= best_ask {
            return Err(OrderBookError::Crossed { best_bid, best_ask });
        }

        Ok(Self {
            asks,
            bids,
            observed_at,
        })
    }

    /// Ask levels, lowest price first.
    #[must_use]
    pub fn asks(&self) -> &[OrderBookLevel] {
        &self.asks
    }

    /// Bid levels, highest price first.
    #[must_use]
    pub fn bids(&self) -> &[OrderBookLevel] {
        &self.bids
    }

    /// When the book was read.
    #[must_use]
    pub const fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Highest bid price.
    #[must_use]
    pub fn best_bid(&self) -> Decimal {
        self.bids[0].price
    }

    /// Lowest ask price.
    #[must_use]
    pub fn best_ask(&self) -> Decimal {
        self.asks[0].price
    }

    /// Midpoint between best bid and best ask.
    #[must_use]
    pub fn mid_price(&self) -> Decimal {
        (self.best_bid() + self.best_ask()) / Decimal::TWO
    }

    /// Best ask minus best bid.
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.best_ask() - self.best_bid()
    }

    /// Spread in basis points of the mid price.
    #[must_use]
    pub fn spread_bps(&self) -> Option<Decimal> {
        let mid = self.mid_price();
        if mid.is_zero() {
            return None;
        }
        Some(self.spread() / mid * Decimal::from(10_000))
    }

    /// Summed size of the top `levels` levels on each side, as `(bid, ask)`.
    #[must_use]
    pub fn depth(&self, levels: usize) -> (Decimal, Decimal) {
        let bid = self.bids.iter().take(levels).map(|l| l.size).sum();
        let ask = self.asks.iter().take(levels).map(|l| l.size).sum();
        (bid, ask)
    }
}

// =============================================================================
// Updates
// =============================================================================

/// A value published by a producer through the update contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUpdate {
    /// New exchange quote.
    Quote(Quote),
    /// New Lighter order book.
    OrderBook(OrderBook),
    /// Lighter connection health changed.
    LighterConnection {
        /// Whether the scraper currently has a serving session.
        connected: bool,
        /// When the change happened.
        at: DateTime<Utc>,
    },
}

impl SourceUpdate {
    /// The source this update belongs to.
    #[must_use]
    pub const fn source(&self) -> Source {
        match self {
            Self::Quote(quote) => quote.source,
            Self::OrderBook(_) | Self::LighterConnection { .. } => Source::Lighter,
        }
    }
}

// =============================================================================
// Aggregated Snapshot
// =============================================================================

/// Local arrival time of the latest value per source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReceivedAt {
    /// Last Binance quote.
    pub binance: Option<DateTime<Utc>>,
    /// Last Backpack quote.
    pub backpack: Option<DateTime<Utc>>,
    /// Last Lighter order book.
    pub lighter: Option<DateTime<Utc>>,
}

impl ReceivedAt {
    /// Arrival time for `source`.
    #[must_use]
    pub const fn get(&self, source: Source) -> Option<DateTime<Utc>> {
        match source {
            Source::Binance => self.binance,
            Source::Backpack => self.backpack,
            Source::Lighter => self.lighter,
        }
    }

    /// Record an arrival for `source`.
    pub fn set(&mut self, source: Source, at: DateTime<Utc>) {
        match source {
            Source::Binance => self.binance = Some(at),
            Source::Backpack => self.backpack = Some(at),
            Source::Lighter => self.lighter = Some(at),
        }
    }
}

/// Point-in-time view across all sources.
///
/// Always an owned copy; later updates never change a snapshot that has
/// already been returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedSnapshot {
    /// Latest Binance quote, if any arrived yet.
    pub binance: Option<Quote>,
    /// Latest Backpack quote, if any arrived yet.
    pub backpack: Option<Quote>,
    /// Latest Lighter order book, if any was scraped yet.
    pub lighter_book: Option<OrderBook>,
    /// Whether the Lighter scraper is currently serving.
    pub lighter_connected: bool,
    /// When each value reached this process.
    pub received_at: ReceivedAt,
    /// When the snapshot was taken.
    pub as_of: DateTime<Utc>,
}

impl AggregatedSnapshot {
    /// Lighter mid price, if a book is present.
    #[must_use]
    pub fn lighter_mid_price(&self) -> Option<Decimal> {
        self.lighter_book.as_ref().map(OrderBook::mid_price)
    }

    /// Lighter spread, if a book is present.
    #[must_use]
    pub fn lighter_spread(&self) -> Option<Decimal> {
        self.lighter_book.as_ref().map(OrderBook::spread)
    }

    /// Observation time of the latest value for `source`.
    #[must_use]
    pub fn observed_at(&self, source: Source) -> Option<DateTime<Utc>> {
        match source {
            Source::Binance => self.binance.as_ref().map(|q| q.observed_at),
            Source::Backpack => self.backpack.as_ref().map(|q| q.observed_at),
            Source::Lighter => self.lighter_book.as_ref().map(OrderBook::observed_at),
        }
    }

    /// Time since the latest value for `source` arrived locally.
    ///
    /// Based on the arrival time, not the source's own timestamp, so a
    /// skewed venue clock or a replayed event time cannot look fresh.
    #[must_use]
    pub fn age_of(&self, source: Source, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.received_at.get(source).map(|at| now - at)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn level(side: Side, price: Decimal, size: Decimal, total: Decimal) -> OrderBookLevel {
        OrderBookLevel::new(side, price, size, total)
    }

    fn sample_book() -> OrderBook {
        OrderBook::new(
            vec![
                level(Side::Ask, dec!(70020), dec!(2), dec!(3)),
                level(Side::Ask, dec!(70010), dec!(1), dec!(1)),
            ],
            vec![
                level(Side::Bid, dec!(69990), dec!(2), dec!(3)),
                level(Side::Bid, dec!(70000), dec!(1), dec!(1)),
            ],
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn derived_prices() {
        let book = sample_book();
        assert_eq!(book.best_bid(), dec!(70000));
        assert_eq!(book.best_ask(), dec!(70010));
        assert_eq!(book.spread(), dec!(10));
        assert_eq!(book.mid_price(), dec!(70005));
    }

    #[test]
    fn levels_are_sorted_on_construction() {
        let book = sample_book();
        assert_eq!(book.asks()[0].price, dec!(70010));
        assert_eq!(book.asks()[1].price, dec!(70020));
        assert_eq!(book.bids()[0].price, dec!(70000));
        assert_eq!(book.bids()[1].price, dec!(69990));
    }

    #[test]
    fn depth_sums_top_levels() {
        let book = sample_book();
        assert_eq!(book.depth(1), (dec!(1), dec!(1)));
        assert_eq!(book.depth(5), (dec!(3), dec!(3)));
    }

    #[test]
    fn spread_bps_relative_to_mid() {
        let book = sample_book();
        let bps = book.spread_bps().unwrap();
        assert!(bps > dec!(1.42) && bps < dec!(1.43), "got {bps}");
    }

    #[test]
    fn empty_side_rejected() {
        let result = OrderBook::new(
            vec![],
            vec![level(Side::Bid, dec!(1), dec!(1), dec!(1))],
            Utc::now(),
        );
        assert_eq!(result.unwrap_err(), OrderBookError::EmptySide(Side::Ask));

        let result = OrderBook::new(
            vec![level(Side::Ask, dec!(1), dec!(1), dec!(1))],
            vec![],
            Utc::now(),
        );
        assert_eq!(result.unwrap_err(), OrderBookError::EmptySide(Side::Bid));
    }

    #[test]
    fn empty_side_error_names_the_side() {
        assert_eq!(Side::Ask.to_string(), "ask");
        assert_eq!(
            OrderBookError::EmptySide(Side::Bid).to_string(),
            "order book bid side is empty"
        );
    }

    #[test]
    fn crossed_book_rejected() {
        let result = OrderBook::new(
            vec![level(Side::Ask, dec!(100), dec!(1), dec!(1))],
            vec![level(Side::Bid, dec!(100), dec!(1), dec!(1))],
            Utc::now(),
        );
        assert!(matches!(result, Err(OrderBookError::Crossed { .. })));
    }

    #[test]
    fn snapshot_helpers_handle_missing_values() {
        let snapshot = AggregatedSnapshot {
            binance: None,
            backpack: None,
            lighter_book: None,
            lighter_connected: false,
            received_at: ReceivedAt::default(),
            as_of: Utc::now(),
        };
        assert!(snapshot.lighter_mid_price().is_none());
        assert!(snapshot.lighter_spread().is_none());
        assert!(snapshot.age_of(Source::Binance, Utc::now()).is_none());
    }

    #[test]
    fn source_names() {
        assert_eq!(Source::Binance.as_str(), "binance");
        assert_eq!(Source::Backpack.as_str(), "backpack");
        assert_eq!(Source::Lighter.to_string(), "lighter");
    }

    proptest! {
        #[test]
        fn constructed_books_are_ordered(
            asks in prop::collection::vec(100_000u32..200_000, 1..40),
            bids in prop::collection::vec(1u32..100_000, 1..40),
        ) {
            let asks = asks
                .into_iter()
                .map(|p| level(Side::Ask, Decimal::from(p), Decimal::ONE, Decimal::ONE))
                .collect();
            let bids = bids
                .into_iter()
                .map(|p| level(Side::Bid, Decimal::from(p), Decimal::ONE, Decimal::ONE))
                .collect();

            let book = OrderBook::new(asks, bids, Utc::now()).unwrap();

            prop_assert!(!book.asks().is_empty());
            prop_assert!(!book.bids().is_empty());
            prop_assert!(book.asks().windows(2).all(|w| w[0].price <= w[1].price));
            prop_assert!(book.bids().windows(2).all(|w| w[0].price >= w[1].price));
            prop_assert_eq!(book.mid_price(), (book.best_bid() + book.best_ask()) / Decimal::TWO);
        }
    }
}
