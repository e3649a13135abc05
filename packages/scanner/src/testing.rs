//! Scripted browser fakes for tests.
//!
//! These stand in for the WebDriver implementations everywhere above the
//! browser seam: navigation, browser strategies, scanners and the browser
//! pool are all exercised against them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::{BrowserHandle, BrowserLauncher, BrowserPage};
use crate::error::ScanError;

/// A scripted page. Evaluation results are served in order, the last one
/// repeating once the script runs dry.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    visited: Vec<String>,
    clicked: Vec<String>,
    typed: Vec<(String, String)>,
    eval_results: Vec<Value>,
    eval_cursor: usize,
    missing_selectors: HashSet<String>,
    redirects: HashMap<String, String>,
    page_source: String,
    crash_on_goto: bool,
    closed: bool,
}

impl FakePage {
    pub fn with_eval_result(mut self, value: Value) -> Self {
        self.eval_results.push(value);
        self
    }

    pub fn with_missing_selector(mut self, selector: impl Into<String>) -> Self {
        self.missing_selectors.insert(selector.into());
        self
    }

    pub fn with_redirect(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.redirects.insert(from.into(), to.into());
        self
    }

    pub fn with_source(mut self, html: impl Into<String>) -> Self {
        self.page_source = html.into();
        self
    }

    pub fn crashing_on_goto(mut self) -> Self {
        self.crash_on_goto = true;
        self
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.clone()
    }

    pub fn clicked(&self) -> Vec<String> {
        self.clicked.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.typed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&mut self, url: &str) -> Result<(), ScanError> {
        if self.crash_on_goto {
            return Err(ScanError::BrowserCrashed("scripted crash".to_string()));
        }
        self.visited.push(url.to_string());
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        css: &str,
        _timeout: Duration,
    ) -> Result<(), ScanError> {
        if self.missing_selectors.contains(css) {
            return Err(ScanError::Navigation {
                step: "wait_for_selector".to_string(),
                message: format!("selector {css:?} never appeared"),
            });
        }
        Ok(())
    }

    async fn click(&mut self, css: &str) -> Result<(), ScanError> {
        self.clicked.push(css.to_string());
        Ok(())
    }

    async fn type_text(&mut self, css: &str, text: &str) -> Result<(), ScanError> {
        self.typed.push((css.to_string(), text.to_string()));
        Ok(())
    }

    async fn evaluate(&mut self, _script: &str) -> Result<Value, ScanError> {
        if self.eval_results.is_empty() {
            return Ok(Value::Null);
        }
        let index = self.eval_cursor.min(self.eval_results.len() - 1);
        self.eval_cursor += 1;
        Ok(self.eval_results[index].clone())
    }

    async fn current_url(&mut self) -> Result<String, ScanError> {
        let last = self
            .visited
            .last()
            .cloned()
            .unwrap_or_else(|| "about:blank".to_string());
        Ok(self.redirects.get(&last).cloned().unwrap_or(last))
    }

    async fn content(&mut self) -> Result<String, ScanError> {
        Ok(self.page_source.clone())
    }

    async fn close(&mut self) -> Result<(), ScanError> {
        self.closed = true;
        Ok(())
    }
}

/// A fake browser instance serving clones of a prototype page.
pub struct FakeBrowser {
    prototype: FakePage,
    connected: AtomicBool,
    pages_opened: AtomicUsize,
}

impl FakeBrowser {
    pub fn new(prototype: FakePage) -> Self {
        Self {
            prototype,
            connected: AtomicBool::new(true),
            pages_opened: AtomicUsize::new(0),
        }
    }

    /// Simulate a crash: the pool must replace this instance on the next
    /// acquire.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn pages_opened(&self) -> usize {
        self.pages_opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScanError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ScanError::BrowserCrashed("instance disconnected".to_string()));
        }
        self.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.prototype.clone()))
    }

    async fn close(&self) -> Result<(), ScanError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher handing out fake browsers; keeps every launched instance
/// reachable so tests can disconnect specific ones.
#[derive(Default)]
pub struct FakeLauncher {
    prototype: FakePage,
    launched: Mutex<Vec<Arc<FakeBrowser>>>,
}

impl FakeLauncher {
    pub fn new(prototype: FakePage) -> Self {
        Self {
            prototype,
            launched: Mutex::new(Vec::new()),
        }
    }

    pub fn launch_count(&self) -> usize {
        self.launched.lock().unwrap().len()
    }

    pub fn browsers(&self) -> Vec<Arc<FakeBrowser>> {
        self.launched.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>, ScanError> {
        let browser = Arc::new(FakeBrowser::new(self.prototype.clone()));
        self.launched.lock().unwrap().push(browser.clone());
        Ok(browser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_page_records_interactions() {
        let mut page = FakePage::default();
        page.goto("https://shop.example/a").await.unwrap();
        page.click(".buy").await.unwrap();
        page.type_text("#q", "toner").await.unwrap();
        assert_eq!(page.visited(), vec!["https://shop.example/a"]);
        assert_eq!(page.clicked(), vec![".buy"]);
        assert_eq!(page.typed(), vec![("#q".to_string(), "toner".to_string())]);
    }

    #[tokio::test]
    async fn eval_results_repeat_the_last_value() {
        let mut page = FakePage::default()
            .with_eval_result(serde_json::json!(1))
            .with_eval_result(serde_json::json!(2));
        assert_eq!(page.evaluate("x").await.unwrap(), serde_json::json!(1));
        assert_eq!(page.evaluate("x").await.unwrap(), serde_json::json!(2));
        assert_eq!(page.evaluate("x").await.unwrap(), serde_json::json!(2));
    }

    #[tokio::test]
    async fn disconnected_browser_refuses_pages() {
        let launcher = FakeLauncher::default();
        let browser = launcher.launch().await.unwrap();
        assert!(browser.is_connected().await);
        launcher.browsers()[0].disconnect();
        assert!(!browser.is_connected().await);
        assert!(browser.new_page().await.is_err());
    }
}
