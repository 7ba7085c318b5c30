//! Order Book Scraper
//!
//! Reads the Lighter order book out of the rendered page.
//!
//! Locators are configuration: an ordered list of [`LocatorSet`]s is tried
//! until one finds both side containers, so a page layout change only needs
//! a new locator set. Within a container each row is read in structured
//! mode (dedicated price/size/total cells) and falls back to tokenizing the
//! row text when a cell is missing.

use std::str::FromStr;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::ports::{BookScraper, ElementHandle, RenderSession, ScrapeError};
use crate::domain::market::{OrderBook, OrderBookLevel, Side};

// =============================================================================
// Configuration
// =============================================================================

/// CSS selectors for one page layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorSet {
    /// Name used in logs.
    pub name: String,
    /// Ask side container.
    pub ask_container: String,
    /// Bid side container.
    pub bid_container: String,
    /// Rows inside the ask container.
    pub ask_rows: String,
    /// Rows inside the bid container.
    pub bid_rows: String,
    /// Price cell inside a row.
    pub price: String,
    /// Size cell inside a row.
    pub size: String,
    /// Cumulative size cell inside a row.
    pub cumulative_size: String,
}

impl LocatorSet {
    /// Lighter's `data-testid` markers.
    #[must_use]
    pub fn test_ids() -> Self {
        Self {
            name: "test_ids".to_string(),
            ask_container: r#"[data-testid="orderbook-asks"]"#.to_string(),
            bid_container: r#"[data-testid="orderbook-bids"]"#.to_string(),
            ask_rows: r#"[data-testid^="ob-ask-"]"#.to_string(),
            bid_rows: r#"[data-testid^="ob-bid-"]"#.to_string(),
            price: r#"[data-testid="price"]"#.to_string(),
            size: r#"[data-testid="size"]"#.to_string(),
            cumulative_size: r#"[data-testid="total-size"]"#.to_string(),
        }
    }

    /// Class-name based layout used by older page builds.
    #[must_use]
    pub fn class_names() -> Self {
        Self {
            name: "class_names".to_string(),
            ask_container: r#"[class*="orderbook"] [class*="asks"]"#.to_string(),
            bid_container: r#"[class*="orderbook"] [class*="bids"]"#.to_string(),
            ask_rows: r#"[class*="row"]"#.to_string(),
            bid_rows: r#"[class*="row"]"#.to_string(),
            price: r#"[class*="price"]"#.to_string(),
            size: r#"[class*="size"]"#.to_string(),
            cumulative_size: r#"[class*="total"]"#.to_string(),
        }
    }

    fn rows(&self, side: Side) -> &str {
        match side {
            Side::Ask => self.ask_rows.as_str(),
            Side::Bid => self.bid_rows.as_str(),
        }
    }
}

/// Scraper configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScraperConfig {
    /// Locator sets, tried in order.
    pub strategies: Vec<LocatorSet>,
    /// Maximum rows read per side.
    pub max_rows: usize,
    /// Maximum characters of page text attached to failure logs.
    pub sample_chars: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            strategies: vec![LocatorSet::test_ids(), LocatorSet::class_names()],
            max_rows: 50,
            sample_chars: 200,
        }
    }
}

// =============================================================================
// Numeric parsing
// =============================================================================

#[allow(clippy::expect_used)] // Pattern is a constant
fn number_regex() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").expect("number regex is valid"))
}

/// Parse a single numeric cell, ignoring thousands separators and
/// surrounding whitespace.
#[must_use]
pub fn parse_number(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// All numeric tokens in `text`, in order of appearance.
#[must_use]
pub fn numeric_tokens(text: &str) -> Vec<Decimal> {
    number_regex()
        .find_iter(text)
        .filter_map(|m| parse_number(m.as_str()))
        .collect()
}

/// Collapse whitespace and cut `text` to at most `max_chars` characters.
#[must_use]
pub fn text_sample(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut sample: String = collapsed.chars().take(max_chars).collect();
    sample.push('…');
    sample
}

// =============================================================================
// Scraper
// =============================================================================

/// Level read from one row before cumulative sizes are settled.
#[derive(Debug, Clone, Copy)]
struct RowValues {
    price: Decimal,
    size: Decimal,
    cumulative_size: Option<Decimal>,
}

/// DOM-driven order book scraper.
#[derive(Debug, Clone, Default)]
pub struct DomBookScraper {
    config: ScraperConfig,
}

impl DomBookScraper {
    /// Create a scraper.
    #[must_use]
    pub const fn new(config: ScraperConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &ScraperConfig {
        &self.config
    }

    async fn locate(
        &self,
        session: &dyn RenderSession,
    ) -> Result<(&LocatorSet, Box<dyn ElementHandle>, Box<dyn ElementHandle>), ScrapeError> {
        for strategy in &self.config.strategies {
            let asks = session.query_one(&strategy.ask_container).await?;
            let bids = session.query_one(&strategy.bid_container).await?;
            match (asks, bids) {
                (Some(asks), Some(bids)) => return Ok((strategy, asks, bids)),
                (asks, bids) => tracing::debug!(
                    strategy = %strategy.name,
                    asks_found = asks.is_some(),
                    bids_found = bids.is_some(),
                    "Locator strategy did not match"
                ),
            }
        }

        let sample = self.page_sample(session).await;
        tracing::warn!(
            strategies = self.config.strategies.len(),
            sample = %sample,
            "Order book containers not found"
        );
        Err(ScrapeError::ContainersMissing {
            strategies: self.config.strategies.len(),
        })
    }

    async fn page_sample(&self, session: &dyn RenderSession) -> String {
        match session.query_one("body").await {
            Ok(Some(body)) => body
                .text()
                .await
                .map(|t| text_sample(&t, self.config.sample_chars))
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    async fn read_side(
        &self,
        container: &dyn ElementHandle,
        strategy: &LocatorSet,
        side: Side,
    ) -> Result<Vec<OrderBookLevel>, ScrapeError> {
        let rows = container.query_all(strategy.rows(side)).await?;

        let mut values = Vec::with_capacity(rows.len().min(self.config.max_rows));
        for row in rows.iter().take(self.config.max_rows) {
            if let Some(v) = read_row(row.as_ref(), strategy).await {
                values.push(v);
            }
        }

        if values.is_empty() {
            let sample = container
                .text()
                .await
                .map(|t| text_sample(&t, self.config.sample_chars))
                .unwrap_or_default();
            tracing::warn!(
                side = side.as_str(),
                rows = rows.len(),
                strategy = %strategy.name,
                sample = %sample,
                "No parseable order book rows"
            );
            return Err(ScrapeError::EmptySide(side));
        }

        match side {
            Side::Ask => values.sort_by(|a, b| a.price.cmp(&b.price)),
            Side::Bid => values.sort_by(|a, b| b.price.cmp(&a.price)),
        }

        let mut running = Decimal::ZERO;
        Ok(values
            .into_iter()
            .map(|v| {
                running += v.size;
                OrderBookLevel::new(side, v.price, v.size, v.cumulative_size.unwrap_or(running))
            })
            .collect())
    }
}

async fn read_row(row: &dyn ElementHandle, strategy: &LocatorSet) -> Option<RowValues> {
    if let Some(values) = read_row_structured(row, strategy).await {
        return Some(values);
    }

    // Degraded mode: positional tokens from the row text.
    let text = row.text().await.ok()?;
    let tokens = numeric_tokens(&text);
    if tokens.len() < 2 {
        tracing::trace!(sample = %text_sample(&text, 80), "Dropping unparseable row");
        return None;
    }
    valid(RowValues {
        price: tokens[0],
        size: tokens[1],
        cumulative_size: tokens.get(2).copied(),
    })
}

async fn read_row_structured(row: &dyn ElementHandle, strategy: &LocatorSet) -> Option<RowValues> {
    let price = cell_number(row, &strategy.price).await?;
    let size = cell_number(row, &strategy.size).await?;
    let cumulative_size = cell_number(row, &strategy.cumulative_size).await?;
    valid(RowValues {
        price,
        size,
        cumulative_size: Some(cumulative_size),
    })
}

async fn cell_number(row: &dyn ElementHandle, selector: &str) -> Option<Decimal> {
    let cell = row.query_one(selector).await.ok()??;
    parse_number(&cell.text().await.ok()?)
}

fn valid(values: RowValues) -> Option<RowValues> {
    (values.price > Decimal::ZERO && values.size >= Decimal::ZERO).then_some(values)
}

#[async_trait]
impl BookScraper for DomBookScraper {
    async fn poll(&self, session: &dyn RenderSession) -> Result<OrderBook, ScrapeError> {
        let (strategy, asks_el, bids_el) = self.locate(session).await?;

        let asks = self.read_side(asks_el.as_ref(), strategy, Side::Ask).await?;
        let bids = self.read_side(bids_el.as_ref(), strategy, Side::Bid).await?;

        OrderBook::new(asks, bids, Utc::now()).map_err(|err| {
            tracing::warn!(strategy = %strategy.name, error = %err, "Rejecting scraped order book");
            ScrapeError::from(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::SessionError;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use test_case::test_case;

    /// Minimal DOM node: children are matched by exact selector string.
    #[derive(Debug, Clone, Default)]
    struct Node {
        text: String,
        children: Vec<(String, Node)>,
    }

    impl Node {
        fn leaf(text: &str) -> Self {
            Self {
                text: text.to_string(),
                children: Vec::new(),
            }
        }

        fn child(mut self, selector: &str, node: Self) -> Self {
            self.children.push((selector.to_string(), node));
            self
        }

        fn matching(&self, selector: &str) -> Vec<Box<dyn ElementHandle>> {
            self.children
                .iter()
                .filter(|(s, _)| s == selector)
                .map(|(_, n)| Box::new(n.clone()) as Box<dyn ElementHandle>)
                .collect()
        }
    }

    #[async_trait]
    impl ElementHandle for Node {
        async fn text(&self) -> Result<String, SessionError> {
            Ok(self.text.clone())
        }

        async fn attribute(&self, _name: &str) -> Result<Option<String>, SessionError> {
            Ok(None)
        }

        async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, SessionError> {
            Ok(self.matching(selector))
        }
    }

    struct Page(Node);

    #[async_trait]
    impl RenderSession for Page {
        async fn navigate(&self, _url: &str) -> Result<(), SessionError> {
            Ok(())
        }
        async fn wait_ready(&self, _timeout: Duration) -> bool {
            true
        }
        async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, SessionError> {
            Ok(self.0.matching(selector))
        }
        async fn is_alive(&self) -> bool {
            true
        }
        async fn refresh(&self) -> Result<(), SessionError> {
            Ok(())
        }
        async fn apply_anti_detection(&self) -> Result<(), SessionError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    fn structured_row(price: &str, size: &str, total: &str) -> Node {
        let ids = LocatorSet::test_ids();
        Node::leaf(&format!("{price} {size} {total}"))
            .child(&ids.price, Node::leaf(price))
            .child(&ids.size, Node::leaf(size))
            .child(&ids.cumulative_size, Node::leaf(total))
    }

    fn page(asks: Vec<Node>, bids: Vec<Node>) -> Page {
        let ids = LocatorSet::test_ids();
        let ask_container = asks
            .into_iter()
            .fold(Node::default(), |c, row| c.child(&ids.ask_rows, row));
        let bid_container = bids
            .into_iter()
            .fold(Node::default(), |c, row| c.child(&ids.bid_rows, row));
        Page(
            Node::leaf("Lighter")
                .child(&ids.ask_container, ask_container)
                .child(&ids.bid_container, bid_container),
        )
    }

    #[tokio::test]
    async fn structured_rows() {
        let page = page(
            vec![structured_row("70,020", "2", "3"), structured_row("70,010", "1", "1")],
            vec![structured_row("70,000", "1", "1"), structured_row("69,990", "2", "3")],
        );

        let book = DomBookScraper::default().poll(&page).await.unwrap();

        assert_eq!(book.best_bid(), dec!(70000));
        assert_eq!(book.best_ask(), dec!(70010));
        assert_eq!(book.spread(), dec!(10));
        assert_eq!(book.mid_price(), dec!(70005));
        assert_eq!(book.asks()[1].cumulative_size, dec!(3));
    }

    #[tokio::test]
    async fn degraded_rows_fall_back_to_text_tokens() {
        let page = page(
            vec![Node::leaf("70,010.5  0.25  0.25")],
            vec![Node::leaf("70,000 0.5"), Node::leaf("69,990 0.5")],
        );

        let book = DomBookScraper::default().poll(&page).await.unwrap();

        assert_eq!(book.best_ask(), dec!(70010.5));
        assert_eq!(book.asks()[0].cumulative_size, dec!(0.25));
        // Missing totals are accumulated from sizes.
        assert_eq!(book.bids()[0].cumulative_size, dec!(0.5));
        assert_eq!(book.bids()[1].cumulative_size, dec!(1.0));
    }

    #[tokio::test]
    async fn rows_with_one_number_are_dropped() {
        let page = page(
            vec![Node::leaf("70010 1"), Node::leaf("--"), Node::leaf("70020")],
            vec![Node::leaf("70000 1")],
        );

        let book = DomBookScraper::default().poll(&page).await.unwrap();
        assert_eq!(book.asks().len(), 1);
    }

    #[tokio::test]
    async fn row_cap_is_applied() {
        let asks = (0..80).map(|i| Node::leaf(&format!("{} 1", 70_010 + i))).collect();
        let page = page(asks, vec![Node::leaf("70000 1")]);

        let scraper = DomBookScraper::new(ScraperConfig {
            max_rows: 10,
            ..ScraperConfig::default()
        });
        let book = scraper.poll(&page).await.unwrap();
        assert_eq!(book.asks().len(), 10);
    }

    #[tokio::test]
    async fn missing_container_fails() {
        let ids = LocatorSet::test_ids();
        let page = Page(Node::leaf("loading").child(&ids.ask_container, Node::default()));

        let err = DomBookScraper::default().poll(&page).await.unwrap_err();
        assert!(matches!(err, ScrapeError::ContainersMissing { strategies: 2 }));
    }

    #[tokio::test]
    async fn later_strategy_is_used_when_first_misses() {
        let classes = LocatorSet::class_names();
        let asks = Node::default().child(&classes.ask_rows, Node::leaf("101 1"));
        let bids = Node::default().child(&classes.bid_rows, Node::leaf("100 1"));
        let page = Page(
            Node::default()
                .child(&classes.ask_container, asks)
                .child(&classes.bid_container, bids),
        );

        let book = DomBookScraper::default().poll(&page).await.unwrap();
        assert_eq!(book.mid_price(), dec!(100.5));
    }

    #[tokio::test]
    async fn empty_side_fails() {
        let page = page(vec![Node::leaf("70010 1")], vec![Node::leaf("n/a")]);
        let err = DomBookScraper::default().poll(&page).await.unwrap_err();
        assert!(matches!(err, ScrapeError::EmptySide(Side::Bid)));
    }

    #[tokio::test]
    async fn crossed_book_fails() {
        let page = page(vec![Node::leaf("70000 1")], vec![Node::leaf("70010 1")]);
        let err = DomBookScraper::default().poll(&page).await.unwrap_err();
        assert!(matches!(err, ScrapeError::CrossedBook { .. }));
        assert_eq!(err.kind(), "crossed_book");
    }

    #[test_case("67,000.5", Some(dec!(67000.5)))]
    #[test_case(" 1,234 ", Some(dec!(1234)))]
    #[test_case("0.0001", Some(dec!(0.0001)))]
    #[test_case("", None)]
    #[test_case("abc", None)]
    fn parse_number_cases(input: &str, expected: Option<Decimal>) {
        assert_eq!(parse_number(input), expected);
    }

    #[test]
    fn tokens_in_order() {
        assert_eq!(
            numeric_tokens("Price 70,010.5 Size 0.25 Total 1,000"),
            vec![dec!(70010.5), dec!(0.25), dec!(1000)]
        );
    }

    #[test]
    fn sample_is_truncated() {
        assert_eq!(text_sample("a   b\n c", 10), "a b c");
        assert_eq!(text_sample("abcdefgh", 3), "abc…");
    }
}
