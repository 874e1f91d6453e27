//! Browser automation seam
//!
//! The extraction pipeline never talks to an automation product
//! directly; it consumes the [`BrowserDriver`] trait. The production
//! implementation drives a headless Chromium through `chromiumoxide`,
//! using script evaluation for everything beyond navigation so the CDP
//! surface we depend on stays small. Tests substitute scripted fakes.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("timed out after {timeout_ms}ms waiting for '{selector}'")]
    WaitTimeout { selector: String, timeout_ms: u64 },

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("browser session error: {0}")]
    Session(String),
}

/// The automation primitives the pipeline consumes.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Resolve once an element matching `selector` is attached, or fail
    /// with [`BrowserError::WaitTimeout`] after the bounded wait.
    async fn wait_for_element(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    /// Outer HTML of every element currently matching `selector`.
    async fn find_elements(&self, selector: &str) -> Result<Vec<String>, BrowserError>;

    async fn execute_script(&self, script: &str) -> Result<serde_json::Value, BrowserError>;

    /// Full serialized DOM of the current page.
    async fn page_source(&self) -> Result<String, BrowserError>;
}

/// One exclusive Chromium session: a launched browser plus a single page.
///
/// The session is owned by one crawl loop for its whole duration and
/// must be released through [`with_session`] (or an explicit
/// [`ChromiumSession::close`]) on every exit path.
pub struct ChromiumSession {
    page: Page,
    browser: Mutex<Browser>,
    handler_task: tokio::task::JoinHandle<()>,
    nav_timeout: Duration,
}

impl ChromiumSession {
    /// Launch a headless Chromium and open a blank page.
    pub async fn launch(nav_timeout_ms: u64) -> Result<Self, BrowserError> {
        let config = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-notifications")
            .arg("--lang=ko-KR")
            .build()
            .map_err(BrowserError::Session)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Session(format!("failed to launch Chromium: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Session(format!("failed to open page: {e}")))?;

        info!("chromium session launched");
        Ok(Self {
            page,
            browser: Mutex::new(browser),
            handler_task,
            nav_timeout: Duration::from_millis(nav_timeout_ms),
        })
    }

    /// Close the browser process. Errors during teardown are logged,
    /// not propagated, so release never masks the body's result.
    pub async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!("browser close failed: {e}");
        }
        if let Err(e) = browser.wait().await {
            debug!("browser wait after close failed: {e}");
        }
        self.handler_task.abort();
        info!("chromium session closed");
    }

    async fn evaluate_value(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }
}

/// Embed a selector into generated JS as a quoted literal.
fn js_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl BrowserDriver for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        debug!("navigating to {url}");
        let nav = tokio::time::timeout(self.nav_timeout, self.page.goto(url)).await;
        match nav {
            Ok(Ok(_)) => {
                // Best effort; some pages never fire a clean load event.
                let _ = tokio::time::timeout(self.nav_timeout, self.page.wait_for_navigation())
                    .await;
                Ok(())
            }
            Ok(Err(e)) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: format!("timed out after {}ms", self.nav_timeout.as_millis()),
            }),
        }
    }

    async fn wait_for_element(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let script = format!("!!document.querySelector({})", js_string(selector));
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.evaluate_value(&script).await? == serde_json::Value::Bool(true) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::WaitTimeout {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<String>, BrowserError> {
        let script = format!(
            "Array.from(document.querySelectorAll({})).map(e => e.outerHTML)",
            js_string(selector)
        );
        let value = self.evaluate_value(&script).await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn execute_script(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        self.evaluate_value(script).await
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        let value = self
            .evaluate_value("document.documentElement.outerHTML")
            .await?;
        value
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| BrowserError::Script("page source was not a string".to_string()))
    }
}

/// Run `body` with a freshly launched session, releasing the browser on
/// every exit path including errors.
pub async fn with_session<T, F, Fut>(nav_timeout_ms: u64, body: F) -> anyhow::Result<T>
where
    F: FnOnce(Arc<ChromiumSession>) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let session = Arc::new(ChromiumSession::launch(nav_timeout_ms).await?);
    let result = body(Arc::clone(&session)).await;
    session.close().await;
    result
}
