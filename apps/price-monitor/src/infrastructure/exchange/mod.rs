//! Exchange WebSocket Feeds
//!
//! Push-based price sources. Each venue describes its URL, subscription and
//! message format; [`FeedClient`] runs the connection lifecycle for any of
//! them.
//!
//! # Connection Lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> Subscribed -> Streaming
//!       ^                                        |
//!       +------- fixed delay (default 5s) -------+
//! ```

/// Binance futures ticker.
pub mod binance;

/// Backpack ticker.
pub mod backpack;

/// Generic read loop and status counters.
pub mod feed;

/// Delay schedule between connection attempts.
pub mod reconnect;

/// Venue trait and shared ticker decoding.
pub mod venue;

pub use backpack::BackpackVenue;
pub use binance::BinanceVenue;
pub use feed::{FeedClient, FeedConfig, FeedError, FeedStatus, FeedStatusSnapshot};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use venue::{Venue, VenueError};
