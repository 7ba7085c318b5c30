//! Application Layer
//!
//! - **Ports**: Interfaces for the render session, scraper, update sink and
//!   time series store
//! - **Services**: Aggregator, scraper, connection supervisor and snapshot
//!   recorder

pub mod ports;
pub mod services;
