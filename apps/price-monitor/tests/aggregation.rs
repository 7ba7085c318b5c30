//! Aggregation Integration Tests
//!
//! Exercises the aggregator as the producers and consumers see it: decoded
//! venue frames going in, owned snapshots and recorded history coming out.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use price_monitor::{
    BinanceVenue, InMemoryTimeSeriesStore, OrderBook, OrderBookLevel, PriceAggregator, Quote,
    Side, SnapshotRecorder, Source, SourceUpdate, TimeSeriesStore, UpdateFanout, UpdateHub,
    UpdateSink, Venue,
};

fn at_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

/// Quote whose price equals its timestamp, so a mismatched pair is detectable.
fn tagged_quote(source: Source, n: i64) -> SourceUpdate {
    SourceUpdate::Quote(Quote::new(source, Decimal::from(n), at_secs(n)))
}

/// Book whose levels all derive from `n`.
fn tagged_book(n: i64) -> SourceUpdate {
    let bid = Decimal::from(n);
    SourceUpdate::OrderBook(
        OrderBook::new(
            vec![OrderBookLevel::new(Side::Ask, bid + dec!(1), dec!(1), dec!(1))],
            vec![OrderBookLevel::new(Side::Bid, bid, dec!(1), dec!(1))],
            at_secs(n),
        )
        .unwrap(),
    )
}

#[test]
fn binance_frame_is_visible_immediately() {
    let aggregator = PriceAggregator::new();
    let venue = BinanceVenue::default();

    let frame = r#"{"e":"24hrTicker","E":1700000000000,"s":"BTCUSDC","c":"67000.5"}"#;
    let quote = venue.parse(frame, Utc::now()).unwrap().unwrap();
    aggregator.on_update(SourceUpdate::Quote(quote));

    let snapshot = aggregator.read();
    let binance = snapshot.binance.unwrap();
    assert_eq!(binance.price, dec!(67000.5));
    assert_eq!(binance.observed_at.timestamp_millis(), 1_700_000_000_000);
}

#[test]
fn snapshots_are_independent_copies() {
    let aggregator = PriceAggregator::new();
    aggregator.update(tagged_quote(Source::Backpack, 100));

    let before = aggregator.read();
    aggregator.update(tagged_quote(Source::Backpack, 200));

    assert_eq!(before.backpack.unwrap().price, dec!(100));
    assert_eq!(aggregator.read().backpack.unwrap().price, dec!(200));
}

#[test]
fn concurrent_updates_never_tear_a_source() {
    let aggregator = Arc::new(PriceAggregator::new());
    let writers: Vec<_> = [Source::Binance, Source::Backpack]
        .into_iter()
        .map(|source| {
            let aggregator = Arc::clone(&aggregator);
            thread::spawn(move || {
                for n in 1..=2_000 {
                    aggregator.update(tagged_quote(source, n));
                }
            })
        })
        .chain(std::iter::once({
            let aggregator = Arc::clone(&aggregator);
            thread::spawn(move || {
                for n in 1..=2_000 {
                    aggregator.update(tagged_book(n));
                }
            })
        }))
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let aggregator = Arc::clone(&aggregator);
            thread::spawn(move || {
                for _ in 0..2_000 {
                    let snapshot = aggregator.read();
                    for quote in [&snapshot.binance, &snapshot.backpack].into_iter().flatten() {
                        assert_eq!(quote.price, Decimal::from(quote.observed_at.timestamp()));
                    }
                    if let Some(book) = &snapshot.lighter_book {
                        assert_eq!(book.best_ask() - book.best_bid(), dec!(1));
                        assert_eq!(book.best_bid(), Decimal::from(book.observed_at().timestamp()));
                    }
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    let last = aggregator.read();
    assert_eq!(last.binance.as_ref().unwrap().price, dec!(2000));
    assert_eq!(last.backpack.as_ref().unwrap().price, dec!(2000));
    assert_eq!(last.lighter_mid_price(), Some(dec!(2000.5)));
}

#[tokio::test]
async fn fanout_feeds_aggregator_and_hub() {
    let aggregator = Arc::new(PriceAggregator::new());
    let hub = Arc::new(UpdateHub::with_defaults());
    let mut quotes = hub.quotes_rx();
    let fanout = UpdateFanout::new()
        .with(Arc::clone(&aggregator) as Arc<dyn UpdateSink>)
        .with(Arc::clone(&hub) as Arc<dyn UpdateSink>);

    fanout.on_update(tagged_quote(Source::Binance, 67_000));

    assert_eq!(aggregator.read().binance.unwrap().price, dec!(67000));
    assert_eq!(quotes.recv().await.unwrap().price, dec!(67000));
}

#[tokio::test]
async fn recorder_skips_until_a_price_arrives() {
    let aggregator = Arc::new(PriceAggregator::new());
    let store = Arc::new(InMemoryTimeSeriesStore::new(10));
    let recorder = SnapshotRecorder::new(
        Arc::clone(&aggregator),
        Arc::clone(&store) as Arc<dyn TimeSeriesStore>,
        Duration::from_secs(60),
        CancellationToken::new(),
    );

    assert!(!recorder.record_once().await.unwrap());
    assert_eq!(store.len().await.unwrap(), 0);

    aggregator.update(tagged_quote(Source::Binance, 67_000));
    aggregator.update(tagged_book(66_999));
    assert!(recorder.record_once().await.unwrap());

    let rows = store.latest(5).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].binance, Some(dec!(67000)));
    assert_eq!(rows[0].backpack, None);
    assert_eq!(rows[0].lighter_mid, Some(dec!(66999.5)));
}

#[tokio::test(start_paused = true)]
async fn recorder_runs_on_its_interval_until_cancelled() {
    let aggregator = Arc::new(PriceAggregator::new());
    aggregator.update(tagged_quote(Source::Backpack, 1));
    let store = Arc::new(InMemoryTimeSeriesStore::new(10));
    let shutdown = CancellationToken::new();
    let recorder = SnapshotRecorder::new(
        aggregator,
        Arc::clone(&store) as Arc<dyn TimeSeriesStore>,
        Duration::from_secs(60),
        shutdown.clone(),
    );
    let task = tokio::spawn(async move { recorder.run().await });

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(store.len().await.unwrap(), 0);

    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(store.len().await.unwrap(), 2);

    shutdown.cancel();
    task.await.unwrap();
}
