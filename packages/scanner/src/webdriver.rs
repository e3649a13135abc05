//! WebDriver-backed implementation of the browser seams.
//!
//! A browser "instance" is one WebDriver session against a chromedriver (or
//! a Selenium grid) endpoint. WebDriver has no per-session incognito
//! contexts, so page isolation is a fresh window with cookies cleared; the
//! pool hands a session to one job at a time, which keeps a single active
//! window per session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::Value;

use crate::browser::{BrowserHandle, BrowserLauncher, BrowserPage};
use crate::error::ScanError;

/// Launches WebDriver sessions with headless-Chrome capabilities.
pub struct WebDriverLauncher {
    webdriver_url: String,
    capabilities: fantoccini::wd::Capabilities,
}

impl WebDriverLauncher {
    pub fn new(webdriver_url: impl Into<String>) -> Self {
        let mut capabilities = fantoccini::wd::Capabilities::new();
        capabilities.insert(
            "goog:chromeOptions".to_string(),
            serde_json::json!({
                "args": ["--headless=new", "--disable-gpu", "--no-sandbox"]
            }),
        );
        Self {
            webdriver_url: webdriver_url.into(),
            capabilities,
        }
    }

    pub fn with_capabilities(
        webdriver_url: impl Into<String>,
        capabilities: fantoccini::wd::Capabilities,
    ) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            capabilities,
        }
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>, ScanError> {
        let mut builder = ClientBuilder::native();
        builder.capabilities(self.capabilities.clone());
        let client = builder
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| ScanError::BrowserCrashed(format!("webdriver session: {e}")))?;
        tracing::debug!(url = %self.webdriver_url, "launched webdriver session");
        Ok(Arc::new(WebDriverBrowser { client }))
    }
}

/// One WebDriver session.
pub struct WebDriverBrowser {
    client: Client,
}

#[async_trait]
impl BrowserHandle for WebDriverBrowser {
    async fn is_connected(&self) -> bool {
        let mut client = self.client.clone();
        client.windows().await.is_ok()
    }

    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScanError> {
        let mut client = self.client.clone();
        let win = client
            .new_window(true)
            .await
            .map_err(|e| map_err("new_window", e))?;
        client
            .switch_to_window(win.handle)
            .await
            .map_err(|e| map_err("switch_to_window", e))?;
        client
            .delete_all_cookies()
            .await
            .map_err(|e| map_err("delete_cookies", e))?;
        Ok(Box::new(WebDriverPage { client }))
    }

    async fn close(&self) -> Result<(), ScanError> {
        // `Client::close` consumes a handle; other clones become inert.
        match self.client.clone().close().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::debug!(error = %e, "webdriver session already closed");
                Ok(())
            }
        }
    }
}

/// One window of a WebDriver session.
pub struct WebDriverPage {
    client: Client,
}

#[async_trait]
impl BrowserPage for WebDriverPage {
    async fn goto(&mut self, url: &str) -> Result<(), ScanError> {
        self.client.goto(url).await.map_err(|e| map_err("goto", e))
    }

    async fn wait_for_selector(
        &mut self,
        css: &str,
        timeout: Duration,
    ) -> Result<(), ScanError> {
        self.client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(css))
            .await
            .map(|_| ())
            .map_err(|e| map_err("wait_for_selector", e))
    }

    async fn click(&mut self, css: &str) -> Result<(), ScanError> {
        let mut element = self
            .client
            .find(Locator::Css(css))
            .await
            .map_err(|e| map_err("find", e))?;
        element.click().await.map_err(|e| map_err("click", e))
    }

    async fn type_text(&mut self, css: &str, text: &str) -> Result<(), ScanError> {
        let mut element = self
            .client
            .find(Locator::Css(css))
            .await
            .map_err(|e| map_err("find", e))?;
        element
            .send_keys(text)
            .await
            .map_err(|e| map_err("send_keys", e))
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, ScanError> {
        self.client
            .execute(script, vec![])
            .await
            .map_err(|e| map_err("evaluate", e))
    }

    async fn current_url(&mut self) -> Result<String, ScanError> {
        self.client
            .current_url()
            .await
            .map(|u| u.to_string())
            .map_err(|e| map_err("current_url", e))
    }

    async fn content(&mut self) -> Result<String, ScanError> {
        self.client
            .source()
            .await
            .map_err(|e| map_err("source", e))
    }

    async fn close(&mut self) -> Result<(), ScanError> {
        match self.client.close_window().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::debug!(error = %e, "window already closed");
                Ok(())
            }
        }
    }
}

fn map_err(op: &str, err: fantoccini::error::CmdError) -> ScanError {
    let message = err.to_string();
    // A dead session surfaces as an invalid-session or closed-connection
    // error on any command.
    if message.contains("invalid session")
        || message.contains("session not created")
        || message.contains("connection closed")
    {
        ScanError::BrowserCrashed(message)
    } else {
        ScanError::Navigation {
            step: op.to_string(),
            message,
        }
    }
}
