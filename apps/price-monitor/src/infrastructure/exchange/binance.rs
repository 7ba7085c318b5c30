//! Binance Futures Ticker
//!
//! 24h rolling ticker of a USDⓈ-M perpetual.
//!
//! # Stream URL
//!
//! `wss://fstream.binance.com/ws/<symbol>@ticker` (symbol lower-cased)
//!
//! # Protocol
//!
//! No subscribe frame; the stream starts on connect. Each frame is one JSON
//! object with the last price in `c` and the event time (ms) in `E`.

use chrono::{DateTime, Utc};

use super::venue::{TickerFields, Venue, VenueError, from_millis};
use crate::domain::market::{Quote, Source};

/// Binance USDⓈ-M futures ticker venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinanceVenue {
    symbol: String,
    base_url: String,
}

impl BinanceVenue {
    /// Production stream host.
    pub const DEFAULT_BASE_URL: &'static str = "wss://fstream.binance.com/ws";
    /// Default contract.
    pub const DEFAULT_SYMBOL: &'static str = "BTCUSDC";

    /// Ticker for `symbol` on the production host.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the stream host, e.g. for a local test server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Configured symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl Default for BinanceVenue {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SYMBOL)
    }
}

impl Venue for BinanceVenue {
    fn source(&self) -> Source {
        Source::Binance
    }

    fn url(&self) -> String {
        format!(
            "{}/{}@ticker",
            self.base_url.trim_end_matches('/'),
            self.symbol.to_lowercase()
        )
    }

    fn parse(&self, text: &str, received_at: DateTime<Utc>) -> Result<Option<Quote>, VenueError> {
        let fields: TickerFields = serde_json::from_str(text)?;
        fields.into_quote(Source::Binance, received_at, from_millis)
    }
}
