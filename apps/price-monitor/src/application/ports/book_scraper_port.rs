//! Book Scraper Port
//!
//! Extracts one order book snapshot from a render session per call. Holds no
//! state between polls; failure accounting belongs to the caller.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::render_session_port::{RenderSession, SessionError};
use crate::domain::market::{OrderBook, OrderBookError, Side};

/// Scrape failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScrapeError {
    /// No locator strategy found both side containers.
    #[error("Order book containers not found ({strategies} strategies tried)")]
    ContainersMissing {
        /// Number of strategies tried.
        strategies: usize,
    },

    /// A side yielded no parseable rows.
    #[error("No parseable {0:?} rows")]
    EmptySide(Side),

    /// Best bid at or above best ask.
    #[error("Crossed book: best bid {best_bid} >= best ask {best_ask}")]
    CrossedBook {
        /// Highest bid.
        best_bid: Decimal,
        /// Lowest ask.
        best_ask: Decimal,
    },

    /// Underlying session call failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<OrderBookError> for ScrapeError {
    fn from(err: OrderBookError) -> Self {
        match err {
            OrderBookError::EmptySide(side) => Self::EmptySide(side),
            OrderBookError::Crossed { best_bid, best_ask } => Self::CrossedBook { best_bid, best_ask },
        }
    }
}

impl ScrapeError {
    /// Short label for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ContainersMissing { .. } => "containers_missing",
            Self::EmptySide(_) => "empty_side",
            Self::CrossedBook { .. } => "crossed_book",
            Self::Session(_) => "session",
        }
    }
}

/// Port for order book extraction.
#[async_trait]
pub trait BookScraper: Send + Sync {
    /// Read one order book from the session.
    async fn poll(&self, session: &dyn RenderSession) -> Result<OrderBook, ScrapeError>;
}
