//! Browser Render Session Adapter
//!
//! Implements the render session port on top of a headless Chromium
//! driven over the DevTools protocol. The Chromium adapter is compiled only
//! with the `chromium` feature; the settings and anti-detection profile are
//! always available so configuration and tests do not need a browser.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Anti-detection profile.
pub mod stealth;

/// Chromium session and factory.
#[cfg(feature = "chromium")]
pub mod chromium;

#[cfg(feature = "chromium")]
pub use chromium::{ChromiumSession, ChromiumSessionFactory};
pub use stealth::AntiDetectionConfig;

/// Well-known browser install locations, checked in order.
pub const BROWSER_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium-browser",
    "/usr/bin/chromium",
    "/snap/bin/chromium",
    "/opt/google/chrome/chrome",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

/// Launch settings for browser sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSettings {
    /// Browser executable; auto-detected when `None`.
    pub executable: Option<PathBuf>,
    /// Run without a visible window.
    pub headless: bool,
    /// Identity and marker suppression.
    pub anti_detection: AntiDetectionConfig,
    /// Element whose presence marks the page as ready. Without it only
    /// `document.readyState` is checked.
    pub ready_selector: Option<String>,
    /// Bound on browser startup.
    pub launch_timeout: Duration,
    /// Pause between readiness probes.
    pub ready_poll_interval: Duration,
    /// Bound on the liveness probe.
    pub liveness_timeout: Duration,
    /// Bound on a graceful browser exit before the process is killed.
    pub close_timeout: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            anti_detection: AntiDetectionConfig::default(),
            ready_selector: Some(r#"[data-testid="orderbook-asks"]"#.to_string()),
            launch_timeout: Duration::from_secs(30),
            ready_poll_interval: Duration::from_millis(250),
            liveness_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(10),
        }
    }
}

impl BrowserSettings {
    /// Configured executable, or the first existing well-known location.
    #[must_use]
    pub fn resolve_executable(&self) -> Option<PathBuf> {
        self.executable
            .clone()
            .or_else(|| first_existing(BROWSER_CANDIDATES))
    }
}

/// First path in `candidates` that exists on disk.
#[must_use]
pub fn first_existing<P: AsRef<Path>>(candidates: &[P]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|p| -> &Path { p.as_ref() })
        .find(|p| p.exists())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_existing_skips_missing_paths() {
        let manifest = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");
        let found = first_existing(&["/definitely/not/a/browser", manifest]);
        assert_eq!(found, Some(PathBuf::from(manifest)));
        assert!(first_existing(&["/definitely/not/a/browser"]).is_none());
    }

    #[test]
    fn configured_executable_wins() {
        let settings = BrowserSettings {
            executable: Some(PathBuf::from("/custom/chrome")),
            ..BrowserSettings::default()
        };
        assert_eq!(
            settings.resolve_executable(),
            Some(PathBuf::from("/custom/chrome"))
        );
    }
}
