//! Render Session Port (Driven Port)
//!
//! Interface over a navigable, DOM-queryable rendering surface: in practice
//! one headless browser tab. The supervisor owns exactly one session at a
//! time and serializes every call on it, so implementations need not guard
//! against concurrent use of the same session.

use std::time::Duration;

use async_trait::async_trait;

/// Render session error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// Browser process could not be started.
    #[error("Failed to launch render session: {message}")]
    LaunchFailed {
        /// Error details.
        message: String,
    },

    /// Page load failed.
    #[error("Navigation to {url} failed: {message}")]
    NavigationFailed {
        /// Target URL.
        url: String,
        /// Error details.
        message: String,
    },

    /// An operation exceeded its bound.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation name.
        operation: &'static str,
        /// Bound that was exceeded.
        after: Duration,
    },

    /// DOM query failed.
    #[error("Query {selector:?} failed: {message}")]
    QueryFailed {
        /// CSS selector.
        selector: String,
        /// Error details.
        message: String,
    },

    /// Script evaluation failed.
    #[error("Script evaluation failed: {message}")]
    ScriptFailed {
        /// Error details.
        message: String,
    },

    /// Session was already closed.
    #[error("Render session is closed")]
    Closed,
}

/// A DOM element returned by a query.
#[async_trait]
pub trait ElementHandle: Send + Sync {
    /// Visible text content of the element and its descendants.
    async fn text(&self) -> Result<String, SessionError>;

    /// Value of an attribute, `None` when absent.
    async fn attribute(&self, name: &str) -> Result<Option<String>, SessionError>;

    /// Descendants matching a CSS selector, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, SessionError>;

    /// First descendant matching a CSS selector.
    async fn query_one(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle>>, SessionError> {
        Ok(self.query_all(selector).await?.into_iter().next())
    }
}

/// One rendering session.
#[async_trait]
pub trait RenderSession: Send + Sync {
    /// Load a page. Does not wait for it to become usable.
    async fn navigate(&self, url: &str) -> Result<(), SessionError>;

    /// Wait until the readiness probe passes or `timeout` elapses.
    ///
    /// Returns `false` on timeout.
    async fn wait_ready(&self, timeout: Duration) -> bool;

    /// Elements matching a CSS selector, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, SessionError>;

    /// First element matching a CSS selector.
    async fn query_one(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle>>, SessionError> {
        Ok(self.query_all(selector).await?.into_iter().next())
    }

    /// Lightweight liveness probe; returns within a short bound.
    async fn is_alive(&self) -> bool;

    /// Reload the current page in place.
    async fn refresh(&self) -> Result<(), SessionError>;

    /// Re-apply the script-injected part of the anti-detection
    /// configuration. Needed after a reload.
    async fn apply_anti_detection(&self) -> Result<(), SessionError>;

    /// Release all resources. Idempotent.
    async fn close(&self) -> Result<(), SessionError>;
}

/// Creates fresh render sessions with the anti-detection configuration
/// already applied.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Create a new session.
    async fn create(&self) -> Result<Box<dyn RenderSession>, SessionError>;
}
