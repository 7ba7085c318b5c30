#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::unreadable_literal
    )
)]

//! Price Monitor - Multi-source BTC price ingestion
//!
//! Keeps the latest BTC price from two exchange WebSocket feeds and the
//! order book of a third venue that only exposes it through a rendered web
//! page. The page is scraped through a supervised headless browser session
//! that degrades, refreshes and reconnects on its own.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure data types
//!   - `market`: quotes, order book, aggregated snapshot
//!   - `connection`: supervisor states and transitions
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: render session, book scraper, update sink, time series store
//!   - `services`: aggregator, DOM scraper, connection supervisor, recorder
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `exchange`: Binance and Backpack WebSocket feeds
//!   - `browser`: Chromium render session and anti-detection profile
//!   - `broadcast`: update hub for async subscribers
//!   - `store`: in-memory snapshot history
//!   - `config`, `telemetry`, `metrics`, `health`
//!
//! # Data Flow
//!
//! ```text
//! Binance WS ──┐
//!              │                    ┌──► PriceAggregator ──► SnapshotRecorder ──► TimeSeriesStore
//! Backpack WS ─┼──► UpdateFanout ───┤
//!              │                    └──► UpdateHub ──► subscribers
//! Lighter page ┘
//!   (ConnectionSupervisor + DomBookScraper)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure data types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ConnectionState, StateTransition};
pub use domain::market::{
    AggregatedSnapshot, OrderBook, OrderBookError, OrderBookLevel, Quote, ReceivedAt, Side,
    Source, SourceUpdate,
};

// Ports
pub use application::ports::{
    BookScraper, ElementHandle, NoOpUpdateSink, RenderSession, ScrapeError, SessionError,
    SessionFactory, SnapshotRecord, StoreError, TimeSeriesStore, UpdateFanout, UpdateSink,
};

// Services
pub use application::services::{
    ConnectionSupervisor, DomBookScraper, LocatorSet, PriceAggregator, ScraperConfig,
    SnapshotRecorder, SupervisorConfig, SupervisorError, SupervisorStatus,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, FeedSettings, MonitorConfig, RecorderSettings, ServerSettings,
};

// Exchange feeds
pub use infrastructure::exchange::{
    BackpackVenue, BinanceVenue, FeedClient, FeedConfig, FeedError, FeedStatus, Venue,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Update hub
pub use infrastructure::broadcast::{BroadcastConfig, SharedUpdateHub, UpdateHub};

// History
pub use infrastructure::store::InMemoryTimeSeriesStore;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
