//! Backpack Ticker
//!
//! # Stream URL
//!
//! `wss://ws.backpack.exchange`
//!
//! # Protocol
//!
//! After connecting, subscribe with
//! `{"method":"SUBSCRIBE","params":["ticker.<symbol>"]}`. Ticker frames are
//! wrapped as `{"stream":"ticker.<symbol>","data":{...}}`; the payload has
//! the last price in `c` and the event time in microseconds in `E`.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::venue::{TickerFields, Venue, VenueError, from_micros};
use crate::domain::market::{Quote, Source};

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    stream: Option<String>,
    data: Option<TickerFields>,
}

/// Backpack ticker venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackpackVenue {
    symbol: String,
    url: String,
}

impl BackpackVenue {
    /// Production stream URL.
    pub const DEFAULT_URL: &'static str = "wss://ws.backpack.exchange";
    /// Default market.
    pub const DEFAULT_SYMBOL: &'static str = "BTC_USDC_PERP";

    /// Ticker for `symbol` on the production host.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            url: Self::DEFAULT_URL.to_string(),
        }
    }

    /// Override the stream URL, e.g. for a local test server.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn stream_name(&self) -> String {
        format!("ticker.{}", self.symbol)
    }
}

impl Default for BackpackVenue {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SYMBOL)
    }
}

impl Venue for BackpackVenue {
    fn source(&self) -> Source {
        Source::Backpack
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn subscribe_message(&self) -> Option<String> {
        Some(
            serde_json::json!({
                "method": "SUBSCRIBE",
                "params": [self.stream_name()],
            })
            .to_string(),
        )
    }

    fn parse(&self, text: &str, received_at: DateTime<Utc>) -> Result<Option<Quote>, VenueError> {
        let envelope: StreamEnvelope = serde_json::from_str(text)?;

        let is_ticker = envelope
            .stream
            .as_deref()
            .is_some_and(|s| s.starts_with("ticker."));
        match envelope.data {
            Some(fields) if is_ticker => fields.into_quote(Source::Backpack, received_at, from_micros),
            _ => Ok(None),
        }
    }
}
