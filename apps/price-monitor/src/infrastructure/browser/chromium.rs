//! Chromium Render Session
//!
//! One headless Chromium process with a single tab per session. The
//! DevTools handler runs on its own task and is aborted on close.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::BrowserSettings;
use crate::application::ports::{ElementHandle, RenderSession, SessionError, SessionFactory};

fn script_error(err: impl std::fmt::Display) -> SessionError {
    SessionError::ScriptFailed {
        message: err.to_string(),
    }
}

// =============================================================================
// Element
// =============================================================================

/// DOM element of a Chromium page.
#[derive(Debug)]
pub struct ChromiumElement(Element);

#[async_trait]
impl ElementHandle for ChromiumElement {
    async fn text(&self) -> Result<String, SessionError> {
        self.0
            .inner_text()
            .await
            .map(Option::unwrap_or_default)
            .map_err(script_error)
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, SessionError> {
        self.0.attribute(name).await.map_err(script_error)
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, SessionError> {
        let elements = self
            .0
            .find_elements(selector)
            .await
            .map_err(|e| SessionError::QueryFailed {
                selector: selector.to_string(),
                message: e.to_string(),
            })?;
        Ok(wrap(elements))
    }
}

fn wrap(elements: Vec<Element>) -> Vec<Box<dyn ElementHandle>> {
    elements
        .into_iter()
        .map(|e| Box::new(ChromiumElement(e)) as Box<dyn ElementHandle>)
        .collect()
}

// =============================================================================
// Session
// =============================================================================

/// One Chromium process and tab.
pub struct ChromiumSession {
    page: Page,
    browser: tokio::sync::Mutex<Option<Browser>>,
    handler: parking_lot::Mutex<Option<JoinHandle<()>>>,
    settings: BrowserSettings,
    closed: AtomicBool,
}

impl std::fmt::Debug for ChromiumSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumSession")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ChromiumSession {
    /// Launch a browser and open one tab with the anti-detection profile
    /// applied.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::LaunchFailed` if no executable is found or the
    /// browser does not start.
    pub async fn launch(settings: BrowserSettings) -> Result<Self, SessionError> {
        let executable = settings
            .resolve_executable()
            .ok_or_else(|| SessionError::LaunchFailed {
                message: "no Chrome/Chromium executable found".to_string(),
            })?;

        let (width, height) = settings.anti_detection.viewport;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(&executable)
            .window_size(width, height)
            .viewport(None)
            .launch_timeout(settings.launch_timeout)
            .args(settings.anti_detection.launch_args());
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|message| SessionError::LaunchFailed { message })?;

        let (browser, mut handler) =
            Browser::launch(config)
                .await
                .map_err(|e| SessionError::LaunchFailed {
                    message: e.to_string(),
                })?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "Browser handler error");
                }
            }
        });

        tracing::info!(
            executable = %executable.display(),
            headless = settings.headless,
            "Browser launched"
        );

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(SessionError::LaunchFailed {
                    message: e.to_string(),
                });
            }
        };

        let session = Self {
            page,
            browser: tokio::sync::Mutex::new(Some(browser)),
            handler: parking_lot::Mutex::new(Some(handler_task)),
            settings,
            closed: AtomicBool::new(false),
        };

        if let Err(e) = session.install_profile().await {
            let _ = session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    /// User agent override plus the init script for every new document.
    async fn install_profile(&self) -> Result<(), SessionError> {
        let profile = &self.settings.anti_detection;

        let mut user_agent = SetUserAgentOverrideParams::new(profile.user_agent.clone());
        user_agent.accept_language = Some(profile.accept_language.clone());
        user_agent.platform = Some(profile.platform.clone());
        self.page.execute(user_agent).await.map_err(script_error)?;

        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(
                profile.init_script(),
            ))
            .await
            .map_err(script_error)?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn ready_probe(&self) -> String {
        match &self.settings.ready_selector {
            Some(selector) => format!(
                "document.readyState === 'complete' && document.querySelector({}) !== null",
                serde_json::Value::String(selector.clone())
            ),
            None => "document.readyState === 'complete'".to_string(),
        }
    }
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.page
            .goto(url)
            .await
            .map_err(|e| SessionError::NavigationFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let probe = self.ready_probe();

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return false;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let ready = tokio::time::timeout(remaining, self.page.evaluate(probe.as_str()))
                .await
                .ok()
                .and_then(Result::ok)
                .and_then(|r| r.into_value::<bool>().ok())
                .unwrap_or(false);
            if ready {
                return true;
            }

            if Instant::now() + self.settings.ready_poll_interval >= deadline {
                return false;
            }
            tokio::time::sleep(self.settings.ready_poll_interval).await;
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, SessionError> {
        self.ensure_open()?;
        let elements =
            self.page
                .find_elements(selector)
                .await
                .map_err(|e| SessionError::QueryFailed {
                    selector: selector.to_string(),
                    message: e.to_string(),
                })?;
        Ok(wrap(elements))
    }

    async fn is_alive(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        matches!(
            tokio::time::timeout(self.settings.liveness_timeout, self.page.get_title()).await,
            Ok(Ok(_))
        )
    }

    async fn refresh(&self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.page
            .reload()
            .await
            .map_err(|e| SessionError::NavigationFailed {
                url: "<reload>".to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn apply_anti_detection(&self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.page
            .evaluate(self.settings.anti_detection.init_script())
            .await
            .map_err(script_error)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let browser = self.browser.lock().await.take();
        let result = match browser {
            Some(browser) => shutdown_browser(browser, self.settings.close_timeout).await,
            None => Ok(()),
        };

        if let Some(handler) = self.handler.lock().take() {
            handler.abort();
        }
        tracing::info!("Browser session closed");
        result
    }
}

/// Ask the browser to exit, killing the process when it does not comply
/// within `bound`. A dead DevTools connection makes `close` fail at once
/// while the process itself may still be running.
async fn shutdown_browser(mut browser: Browser, bound: Duration) -> Result<(), SessionError> {
    let closed = match tokio::time::timeout(bound, browser.close()).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(script_error(e)),
        Err(_) => Err(SessionError::Timeout {
            operation: "close",
            after: bound,
        }),
    };

    if let Err(e) = &closed {
        tracing::warn!(error = %e, "Graceful browser close failed, killing process");
        kill_browser(&mut browser).await;
    }

    match tokio::time::timeout(bound, browser.wait()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "Waiting for browser exit failed"),
        Err(_) => {
            tracing::warn!(after = ?bound, "Browser did not exit, killing process");
            kill_browser(&mut browser).await;
            if let Err(e) = browser.try_wait() {
                tracing::debug!(error = %e, "Reaping browser process failed");
            }
        }
    }
    closed
}

async fn kill_browser(browser: &mut Browser) {
    if let Some(Err(e)) = browser.kill().await {
        tracing::debug!(error = %e, "Killing browser process failed");
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Launches a fresh [`ChromiumSession`] per call.
#[derive(Debug, Clone)]
pub struct ChromiumSessionFactory {
    settings: BrowserSettings,
}

impl ChromiumSessionFactory {
    /// Create a factory.
    #[must_use]
    pub const fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    async fn create(&self) -> Result<Box<dyn RenderSession>, SessionError> {
        let session = ChromiumSession::launch(self.settings.clone()).await?;
        Ok(Box::new(session))
    }
}
