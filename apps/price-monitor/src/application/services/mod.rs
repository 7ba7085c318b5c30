//! Application Services
//!
//! Application services coordinate domain logic and infrastructure adapters.
//! The supervisor and recorder run as long-lived background tasks; the
//! aggregator and scraper are called from them and from the feeds.

mod aggregator;
mod recorder;
mod scraper;
mod supervisor;

pub use aggregator::PriceAggregator;
pub use recorder::SnapshotRecorder;
pub use scraper::{DomBookScraper, LocatorSet, ScraperConfig, numeric_tokens, parse_number, text_sample};
pub use supervisor::{ConnectionSupervisor, SupervisorConfig, SupervisorError, SupervisorStatus};
