//! Exchange Feed Client
//!
//! Generic WebSocket read loop over a [`Venue`]. One client owns one
//! connection; every decoded quote goes straight to the update sink on the
//! read task. Connection loss is never fatal: the client waits out the
//! reconnect delay and connects again until cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::venue::Venue;
use crate::application::ports::UpdateSink;
use crate::application::services::text_sample;
use crate::domain::market::{Source, SourceUpdate};
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one connection.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Handshake did not finish in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// No frame arrived within the idle bound.
    #[error("no message received for {0:?}")]
    Idle(Duration),

    /// Server closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Configured attempt limit reached.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings shared by all venues.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// Bound on the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Reconnect after this long without any frame.
    pub idle_timeout: Duration,
    /// Delay schedule between connection attempts.
    pub reconnect: ReconnectConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            reconnect: ReconnectConfig::default(),
        }
    }
}

// =============================================================================
// Status
// =============================================================================

/// Live counters of one feed.
#[derive(Debug, Default)]
pub struct FeedStatus {
    connected: AtomicBool,
    messages: AtomicU64,
    quotes: AtomicU64,
    parse_errors: AtomicU64,
    reconnects: AtomicU64,
    last_quote_at: Mutex<Option<DateTime<Utc>>>,
}

/// Serializable copy of [`FeedStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedStatusSnapshot {
    /// Whether the socket is currently open.
    pub connected: bool,
    /// Frames received.
    pub messages: u64,
    /// Quotes published.
    pub quotes: u64,
    /// Frames that failed to decode.
    pub parse_errors: u64,
    /// Reconnection attempts.
    pub reconnects: u64,
    /// When the last quote was published.
    pub last_quote_at: Option<DateTime<Utc>>,
}

impl FeedStatus {
    /// Whether the socket is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Copy all counters.
    #[must_use]
    pub fn snapshot(&self) -> FeedStatusSnapshot {
        FeedStatusSnapshot {
            connected: self.connected.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            quotes: self.quotes.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            last_quote_at: *self.last_quote_at.lock(),
        }
    }

    fn set_connected(&self, source: Source, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
        metrics::set_feed_connected(source, connected);
    }
}

// =============================================================================
// Client
// =============================================================================

/// WebSocket client for one venue.
pub struct FeedClient<V: Venue> {
    venue: V,
    config: FeedConfig,
    sink: Arc<dyn UpdateSink>,
    status: Arc<FeedStatus>,
    cancel: CancellationToken,
}

impl<V: Venue> std::fmt::Debug for FeedClient<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("source", &self.venue.source())
            .field("url", &self.venue.url())
            .finish_non_exhaustive()
    }
}

impl<V: Venue> FeedClient<V> {
    /// Create a client. Cancelling `cancel` stops it.
    #[must_use]
    pub fn new(
        venue: V,
        config: FeedConfig,
        sink: Arc<dyn UpdateSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            venue,
            config,
            sink,
            status: Arc::new(FeedStatus::default()),
            cancel,
        }
    }

    /// Shared handle to the live counters.
    #[must_use]
    pub fn status(&self) -> Arc<FeedStatus> {
        Arc::clone(&self.status)
    }

    /// Source served by this client.
    #[must_use]
    pub fn source(&self) -> Source {
        self.venue.source()
    }

    /// Stop reading and suppress further reconnects.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Run the connection loop until stopped.
    ///
    /// # Errors
    ///
    /// Only returns an error when the reconnect policy has an attempt
    /// limit and it is reached. The default policy never gives up.
    pub async fn run(&self) -> Result<(), FeedError> {
        let source = self.venue.source();
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(source = %source, "Feed client cancelled");
                return Ok(());
            }

            let result = self.connect_and_run(&mut policy).await;
            self.status.set_connected(source, false);

            match result {
                Ok(()) => {
                    tracing::info!(source = %source, "Feed connection closed");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(source = %source, error = %e, "Feed connection error");

                    let Some(delay) = policy.next_delay() else {
                        return Err(FeedError::MaxReconnectAttemptsExceeded);
                    };
                    self.status.reconnects.fetch_add(1, Ordering::Relaxed);
                    metrics::record_feed_reconnect(source);
                    tracing::info!(
                        source = %source,
                        attempt = policy.attempt_count(),
                        delay_ms = delay.as_millis(),
                        "Reconnecting to exchange stream"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!(source = %source, "Feed client cancelled during reconnect delay");
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Connect and read until error or cancellation.
    async fn connect_and_run(&self, policy: &mut ReconnectPolicy) -> Result<(), FeedError> {
        let source = self.venue.source();
        let url = self.venue.url();
        tracing::info!(source = %source, url = %url, "Connecting to exchange stream");

        let connect = tokio_tungstenite::connect_async(url.as_str());
        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio::time::timeout(self.config.connect_timeout, connect) => {
                result.map_err(|_| FeedError::ConnectTimeout(self.config.connect_timeout))??
            }
        };

        let (mut write, mut read) = ws_stream.split();

        if let Some(subscribe) = self.venue.subscribe_message() {
            write.send(Message::Text(subscribe.into())).await?;
        }

        self.status.set_connected(source, true);
        policy.reset();
        tracing::info!(source = %source, "Exchange stream connected");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = tokio::time::timeout(self.config.idle_timeout, read.next()) => {
                    match msg {
                        Err(_) => return Err(FeedError::Idle(self.config.idle_timeout)),
                        Ok(Some(Ok(Message::Text(text)))) => self.handle_text(&text),
                        Ok(Some(Ok(Message::Ping(data)))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Ok(Some(Ok(Message::Close(frame)))) => {
                            tracing::info!(source = %source, frame = ?frame, "Server sent close frame");
                            return Err(FeedError::ConnectionClosed);
                        }
                        Ok(Some(Ok(_))) => {}
                        Ok(Some(Err(e))) => return Err(e.into()),
                        Ok(None) => return Err(FeedError::ConnectionClosed),
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let source = self.venue.source();
        self.status.messages.fetch_add(1, Ordering::Relaxed);

        match self.venue.parse(text, Utc::now()) {
            Ok(Some(quote)) => {
                self.status.quotes.fetch_add(1, Ordering::Relaxed);
                *self.status.last_quote_at.lock() = Some(quote.observed_at);
                metrics::record_update(source);
                tracing::trace!(source = %source, price = %quote.price, "Quote received");
                self.sink.on_update(SourceUpdate::Quote(quote));
            }
            Ok(None) => {
                tracing::debug!(source = %source, sample = %text_sample(text, 120), "Control frame");
            }
            Err(e) => {
                self.status.parse_errors.fetch_add(1, Ordering::Relaxed);
                metrics::record_parse_error(source);
                tracing::warn!(
                    source = %source,
                    error = %e,
                    sample = %text_sample(text, 120),
                    "Skipping malformed message"
                );
            }
        }
    }
}
