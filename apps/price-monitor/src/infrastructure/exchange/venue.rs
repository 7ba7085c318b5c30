//! Venue Definitions
//!
//! A [`Venue`] knows where to connect, what to send after connecting, and
//! how to turn one text frame into a quote. Everything else (connection
//! lifecycle, reconnects, pings) lives in the generic feed client.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::market::{Quote, Source};

/// Errors decoding a venue message.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VenueError {
    /// Not valid JSON or unexpected shape.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Price field present but not a decimal.
    #[error("invalid price {0:?}")]
    InvalidPrice(String),
}

impl From<serde_json::Error> for VenueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// One push-based exchange stream.
pub trait Venue: Send + Sync + 'static {
    /// Source the quotes belong to.
    fn source(&self) -> Source;

    /// Stream URL.
    fn url(&self) -> String;

    /// Frame to send right after connecting, if the venue needs one.
    fn subscribe_message(&self) -> Option<String> {
        None
    }

    /// Decode a text frame. `Ok(None)` means a control frame with no price.
    ///
    /// `received_at` is used when the message carries no event time.
    ///
    /// # Errors
    ///
    /// Returns [`VenueError`] for malformed frames.
    fn parse(&self, text: &str, received_at: DateTime<Utc>) -> Result<Option<Quote>, VenueError>;
}

/// Ticker payload fields shared by both venues: `c` is the last price and
/// `E` the event time.
#[derive(Debug, Deserialize)]
pub(crate) struct TickerFields {
    #[serde(rename = "c")]
    pub(crate) last_price: Option<String>,
    #[serde(rename = "E")]
    pub(crate) event_time: Option<i64>,
}

impl TickerFields {
    /// Build a quote using `to_time` to interpret the event time.
    pub(crate) fn into_quote(
        self,
        source: Source,
        received_at: DateTime<Utc>,
        to_time: impl Fn(i64) -> Option<DateTime<Utc>>,
    ) -> Result<Option<Quote>, VenueError> {
        let Some(raw) = self.last_price else {
            return Ok(None);
        };
        let price: Decimal = raw.parse().map_err(|_| VenueError::InvalidPrice(raw.clone()))?;
        if price <= Decimal::ZERO {
            return Err(VenueError::InvalidPrice(raw));
        }
        let observed_at = self.event_time.and_then(to_time).unwrap_or(received_at);
        Ok(Some(Quote::new(source, price, observed_at)))
    }
}

/// Milliseconds since the epoch.
pub(crate) fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Microseconds since the epoch.
pub(crate) fn from_micros(us: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
}
