//! Connection Supervisor
//!
//! Owns the Lighter render session and its health state machine. Three
//! tickers run concurrently once [`ConnectionSupervisor::run`] is awaited:
//!
//! - **poll**: scrapes the book every `scrape_interval` while serving and
//!   tracks the consecutive failure streak
//! - **refresh**: soft-reloads the page `refresh_interval` after the last
//!   (re)connect or refresh, only while serving
//! - **background retry**: one connection attempt every
//!   `background_retry_interval` while disconnected
//!
//! Every access to the session goes through one async mutex, so a scrape
//! never overlaps a refresh or reconnect. The supervisor never gives up on
//! its own; only [`ConnectionSupervisor::stop`] ends it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Notify, broadcast};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BookScraper, RenderSession, SessionError, SessionFactory, UpdateSink};
use crate::domain::connection::{ConnectionState, StateTransition};
use crate::domain::market::{Source, SourceUpdate};
use crate::infrastructure::metrics;

type SessionSlot = Option<Box<dyn RenderSession>>;

// =============================================================================
// Configuration
// =============================================================================

/// Supervisor thresholds, intervals and timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Page to load.
    pub url: String,
    /// Poll ticker period.
    pub scrape_interval: Duration,
    /// Delay between successful (re)connect or refresh and the next refresh.
    pub refresh_interval: Duration,
    /// Period of the retry ticker while disconnected.
    pub background_retry_interval: Duration,
    /// Consecutive failures that turn CONNECTED into DEGRADED.
    pub degrade_threshold: u32,
    /// Consecutive failures that force a reconnect from DEGRADED.
    pub reconnect_threshold: u32,
    /// Attempts made by the initial connect before falling back to the
    /// background retry.
    pub max_initial_attempts: u32,
    /// Pause between initial connect attempts.
    pub initial_retry_delay: Duration,
    /// Attempts per reconnect cycle before giving up to DISCONNECTED.
    pub max_reconnect_attempts: u32,
    /// Bound on every session call without a dedicated timeout: create,
    /// navigate, refresh, anti-detection and close.
    pub navigation_timeout: Duration,
    /// Bound on the readiness wait.
    pub ready_timeout: Duration,
    /// Bound on the liveness probe.
    pub liveness_timeout: Duration,
}

impl SupervisorConfig {
    /// Default URL of the Lighter BTC market page.
    pub const DEFAULT_URL: &'static str = "https://app.lighter.xyz/trade/BTC";
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            url: Self::DEFAULT_URL.to_string(),
            scrape_interval: Duration::from_secs(1),
            refresh_interval: Duration::from_secs(300),
            background_retry_interval: Duration::from_secs(30),
            degrade_threshold: 3,
            reconnect_threshold: 6,
            max_initial_attempts: 3,
            initial_retry_delay: Duration::from_secs(5),
            max_reconnect_attempts: 3,
            navigation_timeout: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(20),
            liveness_timeout: Duration::from_secs(5),
        }
    }
}

/// Supervisor errors.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Session operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Page did not pass the readiness probe in time.
    #[error("page not ready after {0:?}")]
    NotReady(Duration),

    /// `run` was called while already running.
    #[error("supervisor is already running")]
    AlreadyRunning,

    /// `run` was called after `stop`.
    #[error("supervisor is stopped")]
    Stopped,
}

/// Point-in-time view of the supervisor for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    /// Current state.
    pub state: ConnectionState,
    /// Consecutive failed polls.
    pub failure_streak: u32,
    /// Failed attempts in the current reconnect cycle.
    pub reconnect_attempts: u32,
    /// Sessions created since start.
    pub sessions_created: u64,
    /// Last successful scrape.
    pub last_success: Option<DateTime<Utc>>,
    /// Last state change.
    pub last_transition: Option<StateTransition>,
}

// =============================================================================
// Supervisor
// =============================================================================

/// Health-managed owner of the render session.
pub struct ConnectionSupervisor {
    config: SupervisorConfig,
    factory: Arc<dyn SessionFactory>,
    scraper: Arc<dyn BookScraper>,
    sink: Arc<dyn UpdateSink>,
    /// Session-busy lock.
    session: tokio::sync::Mutex<SessionSlot>,
    state: RwLock<ConnectionState>,
    failure_streak: AtomicU32,
    reconnect_attempts: AtomicU32,
    sessions_created: AtomicU64,
    last_success: Mutex<Option<DateTime<Utc>>>,
    last_transition: Mutex<Option<StateTransition>>,
    refresh_due: Mutex<Option<Instant>>,
    refresh_rearmed: Notify,
    transitions: broadcast::Sender<StateTransition>,
    running: AtomicBool,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("url", &self.config.url)
            .field("state", &self.state())
            .field("failure_streak", &self.failure_streak())
            .finish_non_exhaustive()
    }
}

impl ConnectionSupervisor {
    /// Create a supervisor in the DISCONNECTED state.
    #[must_use]
    pub fn new(
        config: SupervisorConfig,
        factory: Arc<dyn SessionFactory>,
        scraper: Arc<dyn BookScraper>,
        sink: Arc<dyn UpdateSink>,
        shutdown: CancellationToken,
    ) -> Self {
        let (transitions, _) = broadcast::channel(64);

        Self {
            config,
            factory,
            scraper,
            sink,
            session: tokio::sync::Mutex::new(None),
            state: RwLock::new(ConnectionState::Disconnected),
            failure_streak: AtomicU32::new(0),
            reconnect_attempts: AtomicU32::new(0),
            sessions_created: AtomicU64::new(0),
            last_success: Mutex::new(None),
            last_transition: Mutex::new(None),
            refresh_due: Mutex::new(None),
            refresh_rearmed: Notify::new(),
            transitions,
            running: AtomicBool::new(false),
            shutdown,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Consecutive failed polls.
    #[must_use]
    pub fn failure_streak(&self) -> u32 {
        self.failure_streak.load(Ordering::SeqCst)
    }

    /// Failed attempts in the current reconnect cycle.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Sessions created since start.
    #[must_use]
    pub fn sessions_created(&self) -> u64 {
        self.sessions_created.load(Ordering::SeqCst)
    }

    /// Subscribe to state transitions.
    #[must_use]
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.transitions.subscribe()
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Snapshot of the counters for health reporting.
    #[must_use]
    pub fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            state: self.state(),
            failure_streak: self.failure_streak(),
            reconnect_attempts: self.reconnect_attempts(),
            sessions_created: self.sessions_created(),
            last_success: *self.last_success.lock(),
            last_transition: self.last_transition.lock().clone(),
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Connect and keep the session healthy until [`stop`](Self::stop).
    ///
    /// Returns once every ticker has observed the shutdown.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::AlreadyRunning` on a second concurrent call
    /// and `SupervisorError::Stopped` after `stop`.
    pub async fn run(&self) -> Result<(), SupervisorError> {
        if self.shutdown.is_cancelled() {
            return Err(SupervisorError::Stopped);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SupervisorError::AlreadyRunning);
        }

        tracing::info!(url = %self.config.url, "Starting connection supervisor");

        self.initial_connect().await;

        tokio::join!(self.poll_loop(), self.refresh_loop(), self.retry_loop());

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Connection supervisor stopped");
        Ok(())
    }

    /// Stop all tickers, close the session and enter STOPPED.
    ///
    /// Waits for an in-flight session operation to finish first; that wait
    /// is bounded by the operation's own timeout.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let mut slot = self.session.lock().await;
        if let Some(session) = slot.take() {
            self.close_quietly(session.as_ref()).await;
        }
        self.transition(ConnectionState::Stopped, "stop");
    }

    async fn initial_connect(&self) {
        let mut slot = self.session.lock().await;
        if self.shutdown.is_cancelled() {
            return;
        }
        self.transition(ConnectionState::Connecting, "start");

        let max_attempts = self.config.max_initial_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.open_session().await {
                Ok(session) => {
                    self.install(&mut slot, session, "initial_connect");
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "Initial connection attempt failed"
                    );
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    () = self.shutdown.cancelled() => return,
                    () = tokio::time::sleep(self.config.initial_retry_delay) => {}
                }
            }
        }

        self.transition(ConnectionState::Disconnected, "initial_attempts_exhausted");
    }

    // -------------------------------------------------------------------------
    // Tickers
    // -------------------------------------------------------------------------

    async fn poll_loop(&self) {
        let mut ticker = tokio::time::interval(self.config.scrape_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.state().is_serving() {
                self.poll_once().await;
            }
        }
    }

    async fn refresh_loop(&self) {
        loop {
            let due = *self.refresh_due.lock();
            let wait = async {
                match due {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = self.refresh_rearmed.notified() => {}
                () = wait => {
                    self.refresh_due.lock().take();
                    self.refresh_once().await;
                }
            }
        }
    }

    async fn retry_loop(&self) {
        let period = self.config.background_retry_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.state() == ConnectionState::Disconnected {
                self.background_attempt().await;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Scrape once and apply the failure accounting.
    pub async fn poll_once(&self) {
        let mut slot = self.session.lock().await;
        if self.shutdown.is_cancelled() {
            return;
        }
        let state = self.state();
        if !state.is_serving() {
            return;
        }
        let Some(session) = slot.as_deref() else {
            return;
        };

        let started = Instant::now();
        let result = self.scraper.poll(session).await;
        metrics::record_scrape_duration(started.elapsed());

        match result {
            Ok(book) => {
                self.failure_streak.store(0, Ordering::SeqCst);
                *self.last_success.lock() = Some(Utc::now());
                if state == ConnectionState::Degraded {
                    self.transition(ConnectionState::Connected, "scrape_recovered");
                }
                metrics::record_update(Source::Lighter);
                self.sink.on_update(SourceUpdate::OrderBook(book));
            }
            Err(e) => {
                let streak = self.failure_streak.fetch_add(1, Ordering::SeqCst) + 1;
                metrics::record_scrape_failure(e.kind());
                tracing::warn!(
                    error = %e,
                    kind = e.kind(),
                    streak,
                    state = %state,
                    "Order book scrape failed"
                );

                match state {
                    ConnectionState::Connected if streak >= self.config.degrade_threshold => {
                        self.transition(ConnectionState::Degraded, "scrape_failures");
                    }
                    ConnectionState::Degraded => {
                        let alive =
                            tokio::time::timeout(self.config.liveness_timeout, session.is_alive())
                                .await
                                .unwrap_or(false);

                        let reason = if !alive {
                            Some("session_unresponsive")
                        } else if streak >= self.config.reconnect_threshold {
                            Some("scrape_failures")
                        } else {
                            None
                        };

                        if let Some(reason) = reason {
                            self.transition(ConnectionState::Reconnecting, reason);
                            self.reconnect(&mut slot).await;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Soft-reload the page, falling back to navigation and then to a
    /// full reconnect.
    pub async fn refresh_once(&self) {
        let mut slot = self.session.lock().await;
        if self.shutdown.is_cancelled() || !self.state().is_serving() {
            tracing::debug!(state = %self.state(), "Skipping refresh");
            return;
        }
        let Some(session) = slot.as_deref() else {
            return;
        };

        self.transition(ConnectionState::Refreshing, "scheduled_refresh");

        let reason = match self.soft_refresh(session).await {
            Ok(()) => Some("refreshed"),
            Err(e) => {
                tracing::warn!(error = %e, "Refresh failed, retrying with navigation");
                match self.renavigate(session).await {
                    Ok(()) => Some("renavigated"),
                    Err(e) => {
                        tracing::warn!(error = %e, "Navigation after failed refresh failed");
                        None
                    }
                }
            }
        };

        if let Some(reason) = reason {
            self.failure_streak.store(0, Ordering::SeqCst);
            self.transition(ConnectionState::Connected, reason);
            self.arm_refresh();
        } else {
            self.transition(ConnectionState::Reconnecting, "refresh_failed");
            self.reconnect(&mut slot).await;
        }
    }

    async fn background_attempt(&self) {
        let mut slot = self.session.lock().await;
        if self.shutdown.is_cancelled() || self.state() != ConnectionState::Disconnected {
            return;
        }

        self.transition(ConnectionState::Connecting, "background_retry");
        if let Some(old) = slot.take() {
            self.close_quietly(old.as_ref()).await;
        }

        match self.open_session().await {
            Ok(session) => self.install(&mut slot, session, "background_retry"),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    retry_in = ?self.config.background_retry_interval,
                    "Background connection attempt failed"
                );
                self.transition(ConnectionState::Disconnected, "background_retry_failed");
            }
        }
    }

    async fn reconnect(&self, slot: &mut SessionSlot) {
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }
            if let Some(old) = slot.take() {
                self.close_quietly(old.as_ref()).await;
            }

            match self.open_session().await {
                Ok(session) => {
                    self.install(slot, session, "reconnected");
                    return;
                }
                Err(e) => {
                    let attempts = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    tracing::warn!(
                        attempt = attempts,
                        max_attempts = self.config.max_reconnect_attempts,
                        error = %e,
                        "Reconnect attempt failed"
                    );
                    if attempts >= self.config.max_reconnect_attempts {
                        self.transition(
                            ConnectionState::Disconnected,
                            "reconnect_attempts_exhausted",
                        );
                        return;
                    }
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Session helpers
    // -------------------------------------------------------------------------

    /// Create a session, load the page and wait for it to become usable.
    async fn open_session(&self) -> Result<Box<dyn RenderSession>, SupervisorError> {
        let session = self.bounded("create", self.factory.create()).await?;
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        metrics::record_session_created();

        if let Err(e) = self.load(session.as_ref()).await {
            self.close_quietly(session.as_ref()).await;
            return Err(e);
        }
        Ok(session)
    }

    async fn load(&self, session: &dyn RenderSession) -> Result<(), SupervisorError> {
        self.bounded("navigate", session.navigate(&self.config.url)).await?;
        self.await_ready(session).await
    }

    async fn soft_refresh(&self, session: &dyn RenderSession) -> Result<(), SupervisorError> {
        self.bounded("refresh", session.refresh()).await?;
        self.bounded("anti_detection", session.apply_anti_detection()).await?;
        self.await_ready(session).await
    }

    async fn renavigate(&self, session: &dyn RenderSession) -> Result<(), SupervisorError> {
        self.load(session).await?;
        self.bounded("anti_detection", session.apply_anti_detection()).await?;
        Ok(())
    }

    /// Run one session call under `navigation_timeout`.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, SessionError>>,
    ) -> Result<T, SessionError> {
        let after = self.config.navigation_timeout;
        tokio::time::timeout(after, call)
            .await
            .map_err(|_| SessionError::Timeout { operation, after })?
    }

    /// Release a session, abandoning it when `close` hangs.
    async fn close_quietly(&self, session: &dyn RenderSession) {
        if let Err(e) = self.bounded("close", session.close()).await {
            tracing::warn!(error = %e, "Failed to close render session");
        }
    }

    async fn await_ready(&self, session: &dyn RenderSession) -> Result<(), SupervisorError> {
        let timeout = self.config.ready_timeout;
        let ready = tokio::time::timeout(timeout, session.wait_ready(timeout))
            .await
            .unwrap_or(false);
        if ready {
            Ok(())
        } else {
            Err(SupervisorError::NotReady(timeout))
        }
    }

    /// Take ownership of a freshly loaded session and enter CONNECTED.
    fn install(&self, slot: &mut SessionSlot, session: Box<dyn RenderSession>, reason: &str) {
        *slot = Some(session);
        self.failure_streak.store(0, Ordering::SeqCst);
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        self.transition(ConnectionState::Connected, reason);
        self.arm_refresh();
    }

    fn arm_refresh(&self) {
        *self.refresh_due.lock() = Some(Instant::now() + self.config.refresh_interval);
        self.refresh_rearmed.notify_one();
    }

    /// Move to `to`, logging and publishing the change. No-op when already
    /// in `to` or once STOPPED.
    fn transition(&self, to: ConnectionState, reason: &str) {
        let from = {
            let mut state = self.state.write();
            let from = *state;
            if from == to || from == ConnectionState::Stopped {
                return;
            }
            *state = to;
            from
        };

        tracing::info!(from = %from, to = %to, reason, "Connection state changed");
        metrics::record_state_transition(to);

        let transition = StateTransition::now(from, to, reason);
        *self.last_transition.lock() = Some(transition.clone());
        let _ = self.transitions.send(transition);

        if from.is_serving() != to.is_serving() {
            self.sink.on_update(SourceUpdate::LighterConnection {
                connected: to.is_serving(),
                at: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds() {
        let config = SupervisorConfig::default();
        assert_eq!(config.degrade_threshold, 3);
        assert_eq!(config.reconnect_threshold, 2 * config.degrade_threshold);
        assert_eq!(config.max_initial_attempts, 3);
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.scrape_interval, Duration::from_secs(1));
        assert_eq!(config.refresh_interval, Duration::from_secs(300));
        assert_eq!(config.background_retry_interval, Duration::from_secs(30));
    }
}
