//! Browser seams.
//!
//! Everything above the WebDriver wire speaks these traits, so the pool,
//! the navigation interpreter and the browser strategies are all testable
//! against the scripted fakes in [`crate::testing`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ScanError;

/// Launches browser instances. The pool owns one of these and uses it both
/// for initial fill and for replacing crashed instances.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>, ScanError>;
}

/// One long-lived browser instance.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Cheap liveness probe; `false` means the instance must be replaced.
    async fn is_connected(&self) -> bool;

    /// Open a fresh, isolated page (no cookies or storage carried over).
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScanError>;

    /// Close the instance. Idempotent.
    async fn close(&self) -> Result<(), ScanError>;
}

/// A single page within a browser instance.
///
/// Scans drive exactly one page at a time; the scan node rotates pages
/// periodically to bound memory growth.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn goto(&mut self, url: &str) -> Result<(), ScanError>;

    async fn wait_for_selector(
        &mut self,
        css: &str,
        timeout: Duration,
    ) -> Result<(), ScanError>;

    async fn click(&mut self, css: &str) -> Result<(), ScanError>;

    async fn type_text(&mut self, css: &str, text: &str) -> Result<(), ScanError>;

    /// Evaluate javascript in the page and return its JSON result.
    async fn evaluate(&mut self, script: &str) -> Result<Value, ScanError>;

    /// The URL the page ended up on (redirects included).
    async fn current_url(&mut self) -> Result<String, ScanError>;

    /// The page's rendered HTML source.
    async fn content(&mut self) -> Result<String, ScanError>;

    async fn close(&mut self) -> Result<(), ScanError>;
}
