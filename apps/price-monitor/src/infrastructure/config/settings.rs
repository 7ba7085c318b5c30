//! Monitor Configuration Settings
//!
//! Configuration types for the price monitor, loaded from environment
//! variables. Every value has a default; only malformed or inconsistent
//! values are rejected.

use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::{ScraperConfig, SupervisorConfig};
use crate::infrastructure::browser::BrowserSettings;
use crate::infrastructure::exchange::{
    BackpackVenue, BinanceVenue, FeedConfig, ReconnectConfig,
};

/// Exchange feed settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    /// Binance futures symbol.
    pub binance_symbol: String,
    /// Binance stream base URL.
    pub binance_url: String,
    /// Backpack symbol.
    pub backpack_symbol: String,
    /// Backpack stream URL.
    pub backpack_url: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Bound on the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Reconnect after this long without a frame.
    pub idle_timeout: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            binance_symbol: BinanceVenue::DEFAULT_SYMBOL.to_string(),
            binance_url: BinanceVenue::DEFAULT_BASE_URL.to_string(),
            backpack_symbol: BackpackVenue::DEFAULT_SYMBOL.to_string(),
            backpack_url: BackpackVenue::DEFAULT_URL.to_string(),
            reconnect_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl FeedSettings {
    /// Connection settings shared by both feeds.
    #[must_use]
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            connect_timeout: self.connect_timeout,
            idle_timeout: self.idle_timeout,
            reconnect: ReconnectConfig::fixed(self.reconnect_delay),
        }
    }

    /// Binance venue for the configured symbol.
    #[must_use]
    pub fn binance(&self) -> BinanceVenue {
        BinanceVenue::new(&self.binance_symbol).with_base_url(&self.binance_url)
    }

    /// Backpack venue for the configured symbol.
    #[must_use]
    pub fn backpack(&self) -> BackpackVenue {
        BackpackVenue::new(&self.backpack_symbol).with_url(&self.backpack_url)
    }
}

/// Snapshot recording settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderSettings {
    /// Period between recorded snapshots.
    pub interval: Duration,
    /// Records kept in memory before the oldest is evicted.
    pub history_capacity: usize,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            history_capacity: 10_080,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Complete monitor configuration.
#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    /// Binance and Backpack feeds.
    pub feeds: FeedSettings,
    /// Lighter session supervision.
    pub supervisor: SupervisorConfig,
    /// Browser launch.
    pub browser: BrowserSettings,
    /// Order book extraction.
    pub scraper: ScraperConfig,
    /// Snapshot recording.
    pub recorder: RecorderSettings,
    /// Server ports.
    pub server: ServerSettings,
}

impl MonitorConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is malformed or the thresholds are
    /// inconsistent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`MonitorConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let defaults = Self::default();

        let feeds = FeedSettings {
            binance_symbol: env.string("BINANCE_SYMBOL", defaults.feeds.binance_symbol)?,
            binance_url: env.string("BINANCE_WS_URL", defaults.feeds.binance_url)?,
            backpack_symbol: env.string("BACKPACK_SYMBOL", defaults.feeds.backpack_symbol)?,
            backpack_url: env.string("BACKPACK_WS_URL", defaults.feeds.backpack_url)?,
            reconnect_delay: env.secs("FEED_RECONNECT_DELAY_SECS", defaults.feeds.reconnect_delay)?,
            connect_timeout: env.secs("FEED_CONNECT_TIMEOUT_SECS", defaults.feeds.connect_timeout)?,
            idle_timeout: env.secs("FEED_IDLE_TIMEOUT_SECS", defaults.feeds.idle_timeout)?,
        };

        let d = defaults.supervisor;
        let supervisor = SupervisorConfig {
            url: env.string("LIGHTER_URL", d.url)?,
            scrape_interval: env.millis("LIGHTER_SCRAPE_INTERVAL_MS", d.scrape_interval)?,
            refresh_interval: env.secs("LIGHTER_REFRESH_INTERVAL_SECS", d.refresh_interval)?,
            background_retry_interval: env
                .secs("LIGHTER_RETRY_INTERVAL_SECS", d.background_retry_interval)?,
            degrade_threshold: env.number("LIGHTER_DEGRADE_THRESHOLD", d.degrade_threshold)?,
            reconnect_threshold: env.number("LIGHTER_RECONNECT_THRESHOLD", d.reconnect_threshold)?,
            max_initial_attempts: env
                .number("LIGHTER_MAX_INITIAL_ATTEMPTS", d.max_initial_attempts)?,
            initial_retry_delay: env
                .secs("LIGHTER_INITIAL_RETRY_DELAY_SECS", d.initial_retry_delay)?,
            max_reconnect_attempts: env
                .number("LIGHTER_MAX_RECONNECT_ATTEMPTS", d.max_reconnect_attempts)?,
            navigation_timeout: env
                .secs("LIGHTER_NAVIGATION_TIMEOUT_SECS", d.navigation_timeout)?,
            ready_timeout: env.secs("LIGHTER_READY_TIMEOUT_SECS", d.ready_timeout)?,
            liveness_timeout: env.secs("LIGHTER_LIVENESS_TIMEOUT_SECS", d.liveness_timeout)?,
        };

        let b = defaults.browser;
        let browser = BrowserSettings {
            executable: env.optional("BROWSER_PATH").map(PathBuf::from),
            headless: env.flag("BROWSER_HEADLESS", b.headless)?,
            launch_timeout: env.secs("BROWSER_LAUNCH_TIMEOUT_SECS", b.launch_timeout)?,
            close_timeout: env.secs("BROWSER_CLOSE_TIMEOUT_SECS", b.close_timeout)?,
            liveness_timeout: supervisor.liveness_timeout,
            ..b
        };

        let scraper = ScraperConfig {
            max_rows: env.number("LIGHTER_MAX_ROWS", defaults.scraper.max_rows)?,
            ..defaults.scraper
        };

        let recorder = RecorderSettings {
            interval: env.secs("RECORD_INTERVAL_SECS", defaults.recorder.interval)?,
            history_capacity: env.number("HISTORY_CAPACITY", defaults.recorder.history_capacity)?,
        };

        let server = ServerSettings {
            health_port: env.number("HEALTH_PORT", defaults.server.health_port)?,
        };

        let config = Self {
            feeds,
            supervisor,
            browser,
            scraper,
            recorder,
            server,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Inconsistent` on the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.supervisor;
        if s.degrade_threshold == 0 {
            return Err(ConfigError::Inconsistent(
                "degrade threshold must be at least 1".to_string(),
            ));
        }
        if s.reconnect_threshold < s.degrade_threshold {
            return Err(ConfigError::Inconsistent(format!(
                "reconnect threshold {} is below degrade threshold {}",
                s.reconnect_threshold, s.degrade_threshold
            )));
        }
        if s.max_initial_attempts == 0 || s.max_reconnect_attempts == 0 {
            return Err(ConfigError::Inconsistent(
                "attempt limits must be at least 1".to_string(),
            ));
        }
        let periods = [
            ("scrape interval", s.scrape_interval),
            ("refresh interval", s.refresh_interval),
            ("background retry interval", s.background_retry_interval),
            ("record interval", self.recorder.interval),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Inconsistent(format!("{name} must be non-zero")));
        }
        if self.recorder.history_capacity == 0 {
            return Err(ConfigError::Inconsistent(
                "history capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable could not be parsed.
    #[error("invalid value {value:?} for {key}: expected {expected}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
        /// What was expected.
        expected: &'static str,
    },
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Values parse but contradict each other.
    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}

// =============================================================================
// Parsing Helpers
// =============================================================================

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: String) -> Result<String, ConfigError> {
        match (self.0)(key) {
            None => Ok(default),
            Some(v) if v.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
            Some(v) => Ok(v.trim().to_string()),
        }
    }

    fn number<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        self.parse(key, default, "a non-negative integer", |v| v.parse().ok())
    }

    fn secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(key, default, "whole seconds", |v| {
            v.parse::<u64>().ok().map(Duration::from_secs)
        })
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(key, default, "whole milliseconds", |v| {
            v.parse::<u64>().ok().map(Duration::from_millis)
        })
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        self.parse(key, default, "true or false", |v| {
            match v.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            }
        })
    }

    fn parse<T>(
        &self,
        key: &str,
        default: T,
        expected: &'static str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<T, ConfigError> {
        let Some(value) = self.optional(key) else {
            return Ok(default);
        };
        parse(&value).ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
            expected,
        })
    }
}
