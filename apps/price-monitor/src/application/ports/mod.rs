//! Application Ports (Driver and Driven)
//!
//! Ports define interfaces for interacting with external systems.
//! - **Driven Ports**: the render session and its factory, the time series
//!   store
//! - **Internal seams**: the book scraper and the update sink, so the
//!   supervisor and feeds can be exercised with fakes

mod book_scraper_port;
mod render_session_port;
mod time_series_port;
mod update_sink_port;

pub use book_scraper_port::{BookScraper, ScrapeError};
pub use render_session_port::{ElementHandle, RenderSession, SessionError, SessionFactory};
pub use time_series_port::{SnapshotRecord, StoreError, TimeSeriesStore};
pub use update_sink_port::{NoOpUpdateSink, UpdateFanout, UpdateSink};
