//! Connection State
//!
//! Lifecycle states of the supervised Lighter render session and the
//! transition records emitted whenever the state changes.
//!
//! ```text
//! Disconnected ──start──────────► Connecting ──ready──► Connected
//! Connecting   ──attempts spent─► Disconnected ──background retry──► Connected
//! Connected    ──failure streak─► Degraded ──one good poll──► Connected
//! Connected/Degraded ──refresh──► Refreshing ──ok──► Connected
//! Degraded/Refreshing ──────────► Reconnecting ──ok──► Connected
//! Reconnecting ──attempts spent─► Disconnected
//! any          ──stop───────────► Stopped
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle state of the render session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No usable session; the background retry keeps trying.
    Disconnected,
    /// Initial connection in progress.
    Connecting,
    /// Session healthy and polled.
    Connected,
    /// Consecutive scrape failures crossed the degrade threshold.
    Degraded,
    /// Scheduled soft reload in progress.
    Refreshing,
    /// Tearing down and recreating the session.
    Reconnecting,
    /// Shut down; terminal.
    Stopped,
}

impl ConnectionState {
    /// Upper-case state name as it appears in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Degraded => "DEGRADED",
            Self::Refreshing => "REFRESHING",
            Self::Reconnecting => "RECONNECTING",
            Self::Stopped => "STOPPED",
        }
    }

    /// States in which the session is polled and its data published.
    #[must_use]
    pub const fn is_serving(self) -> bool {
        matches!(self, Self::Connected | Self::Degraded)
    }

    /// Numeric code for the state gauge.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Degraded => 3,
            Self::Refreshing => 4,
            Self::Reconnecting => 5,
            Self::Stopped => 6,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single state change of the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    /// Previous state.
    pub from: ConnectionState,
    /// New state.
    pub to: ConnectionState,
    /// Short machine-friendly reason, e.g. `scrape_failures`.
    pub reason: String,
    /// When the transition happened.
    pub at: DateTime<Utc>,
}

impl StateTransition {
    /// Record a transition happening now.
    #[must_use]
    pub fn now(from: ConnectionState, to: ConnectionState, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            reason: reason.into(),
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ConnectionState::Disconnected, false)]
    #[test_case(ConnectionState::Connecting, false)]
    #[test_case(ConnectionState::Connected, true)]
    #[test_case(ConnectionState::Degraded, true)]
    #[test_case(ConnectionState::Refreshing, false)]
    #[test_case(ConnectionState::Reconnecting, false)]
    #[test_case(ConnectionState::Stopped, false)]
    fn serving_states(state: ConnectionState, expected: bool) {
        assert_eq!(state.is_serving(), expected);
    }

    #[test]
    fn display_is_upper_case() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "RECONNECTING");
        assert_eq!(
            serde_json::to_string(&ConnectionState::Disconnected).unwrap(),
            "\"DISCONNECTED\""
        );
    }
}
