//! Headless-browser extraction strategy.
//!
//! Runs the configured navigation steps, evaluates the extraction script
//! and hands the resulting payload (plus any values stored during
//! navigation) to the extraction facade. The browser instance comes from
//! the caller; per-scan page lifecycle is the scan node's responsibility.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{ScanStrategy, StrategyPayload};
use crate::browser::BrowserPage;
use crate::error::ScanError;
use crate::navigation::{render_template, run_steps, NavStep};

pub struct BrowserStrategy {
    pub(crate) id: String,
    pub(crate) priority: u32,
    pub(crate) steps: Vec<NavStep>,
    pub(crate) extract_script: String,
    pub(crate) step_timeout: Duration,
    pub(crate) delay: Duration,
}

#[async_trait]
impl ScanStrategy for BrowserStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn requires_browser(&self) -> bool {
        true
    }

    async fn fetch(
        &self,
        product_id: &str,
        page: Option<&mut (dyn BrowserPage + '_)>,
        cancel: &CancellationToken,
    ) -> Result<StrategyPayload, ScanError> {
        let page = page.ok_or(ScanError::MissingBrowser)?;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let stored = run_steps(page, &self.steps, product_id, self.step_timeout, cancel).await?;

        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let mut payload = page
            .evaluate(&render_template(&self.extract_script, product_id))
            .await?;

        // Values stored during navigation ride along at the top level so
        // field maps can reference them.
        if let Value::Object(map) = &mut payload {
            for (key, value) in stored {
                map.entry(key).or_insert(value);
            }
        }

        let final_url = page.current_url().await.ok();

        Ok(StrategyPayload {
            value: payload,
            final_url,
            http_not_found: false,
            canonical: false,
        })
    }
}
