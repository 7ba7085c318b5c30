//! Configuration Module
//!
//! Environment-driven configuration for the price monitor.

mod settings;

pub use settings::{
    ConfigError, FeedSettings, MonitorConfig, RecorderSettings, ServerSettings,
};
