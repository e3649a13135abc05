//! Scan node: runs the platform scanner over the fetched target list.
//!
//! Browser platforms borrow one pool instance for the whole node, open a
//! fresh page for the job, rotate the page every `rotate_after_scans` scans
//! to bound memory, and release the instance on every exit path. A crashed
//! browser is replaced by the pool and the scan retried once on the fresh
//! instance before the node fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use scanner::browser::BrowserPage;
use scanner::{ProductScanner, ScanError, ScanMethod, ScannerSet};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::kernel::browser_pool::{BrowserPool, PooledBrowser};
use crate::kernel::workflow::context::NodeContext;
use crate::kernel::workflow::node::{NodeError, NodeErrorKind, NodeResult, WorkflowNode};

pub struct ScanNode {
    scanners: Arc<dyn ScannerSet>,
    pool: Arc<BrowserPool>,
}

impl ScanNode {
    pub fn new(scanners: Arc<dyn ScannerSet>, pool: Arc<BrowserPool>) -> Self {
        Self { scanners, pool }
    }
}

/// One scan target, parsed out of the previous node's output.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TargetRef {
    pub url: String,
    #[serde(default)]
    pub product_id: Option<String>,
}

/// Find the target list in the node input: directly under `targets`, or
/// under any prior node's output when the input is the accumulated map.
pub(crate) fn extract_targets(input: &Value) -> Option<Vec<TargetRef>> {
    let parse = |v: &Value| serde_json::from_value::<Vec<TargetRef>>(v.clone()).ok();

    if let Some(targets) = input.get("targets") {
        return parse(targets);
    }
    input.as_object().and_then(|map| {
        map.values()
            .filter_map(|v| v.get("targets"))
            .find_map(parse)
    })
}

#[async_trait]
impl WorkflowNode for ScanNode {
    fn node_type(&self) -> &'static str {
        "scan"
    }

    async fn validate(&self, input: &Value) -> Result<(), NodeError> {
        match extract_targets(input) {
            Some(_) => Ok(()),
            None => Err(NodeError::new(
                NodeErrorKind::ValidationFailed,
                "scan input carries no targets list",
            )),
        }
    }

    async fn execute(&self, input: Value, ctx: &NodeContext) -> NodeResult {
        let Some(targets) = extract_targets(&input) else {
            return NodeResult::fail(NodeError::new(
                NodeErrorKind::ValidationFailed,
                "scan input carries no targets list",
            ));
        };
        let Some(scanner) = self.scanners.get(ctx.platform) else {
            return NodeResult::fail(NodeError::internal(format!(
                "no scanner registered for {}",
                ctx.platform
            )));
        };

        let scan_delay = Duration::from_millis(
            ctx.platform_config
                .as_ref()
                .map(|c| c.rate_limit.scan_delay_ms)
                .unwrap_or(0),
        );
        let rotate_after = ctx
            .platform_config
            .as_ref()
            .map(|c| c.rotate_after_scans)
            .unwrap_or(0);

        match scan_targets(&scanner, &self.pool, ctx, &targets, scan_delay, rotate_after).await {
            Ok(rows) => NodeResult::ok(json!({ "scans": rows })),
            Err(e) => NodeResult::fail(e),
        }
    }
}

/// Scan every target, acquiring a browser when the platform needs one.
/// Shared with the monitor node.
pub(crate) async fn scan_targets(
    scanner: &Arc<dyn ProductScanner>,
    pool: &Arc<BrowserPool>,
    ctx: &NodeContext,
    targets: &[TargetRef],
    scan_delay: Duration,
    rotate_after: u32,
) -> Result<Vec<Value>, NodeError> {
    let needs_browser = scanner.scan_method() == ScanMethod::Browser;

    let mut held: Option<PooledBrowser> = None;
    let mut page: Option<Box<dyn BrowserPage>> = None;
    if needs_browser {
        let borrowed = pool.acquire().await.map_err(NodeError::from)?;
        let fresh = borrowed
            .browser()
            .new_page()
            .await
            .map_err(NodeError::from)?;
        held = Some(borrowed);
        page = Some(fresh);
    }

    let result = scan_loop(
        scanner,
        pool,
        ctx,
        targets,
        scan_delay,
        rotate_after,
        &mut held,
        &mut page,
    )
    .await;

    // Page cleanup on every exit path; dropping `held` returns the slot.
    if let Some(mut open_page) = page {
        if let Err(e) = open_page.close().await {
            tracing::debug!(error = %e, "page close failed after scan");
        }
    }

    result
}

#[allow(clippy::too_many_arguments)]
async fn scan_loop(
    scanner: &Arc<dyn ProductScanner>,
    pool: &Arc<BrowserPool>,
    ctx: &NodeContext,
    targets: &[TargetRef],
    scan_delay: Duration,
    rotate_after: u32,
    held: &mut Option<PooledBrowser>,
    page: &mut Option<Box<dyn BrowserPage>>,
) -> Result<Vec<Value>, NodeError> {
    let mut rows = Vec::with_capacity(targets.len());

    for (index, target) in targets.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            return Err(NodeError::new(NodeErrorKind::Cancelled, "job cancelled"));
        }
        if index > 0 && !scan_delay.is_zero() {
            tokio::time::sleep(scan_delay).await;
        }
        if index > 0 && rotate_after > 0 && index as u32 % rotate_after == 0 {
            rotate_page(held, page).await?;
        }

        let mut outcome = scanner
            .scan(
                &target.url,
                page.as_mut().map(|p| &mut **p),
                &ctx.cancel,
            )
            .await;

        // One retry on a fresh instance after a browser crash.
        if let Err(ScanError::BrowserCrashed(message)) = &outcome {
            tracing::warn!(
                job_id = %ctx.job_id,
                url = %target.url,
                error = %message,
                "browser crashed mid-scan, replacing instance"
            );
            replace_browser(pool, held, page).await?;
            outcome = scanner
                .scan(
                    &target.url,
                    page.as_mut().map(|p| &mut **p),
                    &ctx.cancel,
                )
                .await;
        }

        let product_id = target
            .product_id
            .clone()
            .or_else(|| scanner.extract_product_id(&target.url))
            .unwrap_or_else(|| target.url.clone());

        match outcome {
            Ok(result) if result.is_not_found => rows.push(json!({
                "product_id": result.product_id,
                "url": target.url,
                "status": "not_found",
                "strategy": result.strategy,
                "scanned_at": result.scanned_at,
            })),
            Ok(result) => rows.push(json!({
                "product_id": result.product_id,
                "url": target.url,
                "status": "success",
                "strategy": result.strategy,
                "record": result.record,
                "scanned_at": result.scanned_at,
            })),
            Err(ScanError::Cancelled) => {
                return Err(NodeError::new(NodeErrorKind::Cancelled, "job cancelled"))
            }
            Err(e @ ScanError::BrowserCrashed(_)) => return Err(e.into()),
            Err(e) => {
                tracing::warn!(job_id = %ctx.job_id, url = %target.url, error = %e, "scan failed");
                rows.push(json!({
                    "product_id": product_id,
                    "url": target.url,
                    "status": "failed",
                    "error": e.to_string(),
                    "scanned_at": Utc::now(),
                }));
            }
        }
    }

    Ok(rows)
}

async fn rotate_page(
    held: &mut Option<PooledBrowser>,
    page: &mut Option<Box<dyn BrowserPage>>,
) -> Result<(), NodeError> {
    let Some(borrowed) = held.as_ref() else {
        return Ok(());
    };
    if let Some(mut old) = page.take() {
        if let Err(e) = old.close().await {
            tracing::debug!(error = %e, "stale page close failed during rotation");
        }
    }
    *page = Some(
        borrowed
            .browser()
            .new_page()
            .await
            .map_err(NodeError::from)?,
    );
    Ok(())
}

async fn replace_browser(
    pool: &Arc<BrowserPool>,
    held: &mut Option<PooledBrowser>,
    page: &mut Option<Box<dyn BrowserPage>>,
) -> Result<(), NodeError> {
    let Some(borrowed) = held.as_mut() else {
        return Ok(());
    };
    page.take(); // the old page died with its browser
    pool.replace(borrowed).await.map_err(NodeError::from)?;
    *page = Some(
        borrowed
            .browser()
            .new_page()
            .await
            .map_err(NodeError::from)?,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_parse_from_direct_output() {
        let input = json!({"targets": [{"url": "https://a/1", "product_id": "1"}]});
        let targets = extract_targets(&input).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].product_id.as_deref(), Some("1"));
    }

    #[test]
    fn targets_parse_from_accumulated_map() {
        let input = json!({
            "fetch": {"targets": [{"url": "https://a/1"}, {"url": "https://a/2"}]},
            "other": {"unrelated": true}
        });
        let targets = extract_targets(&input).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets[0].product_id.is_none());
    }

    #[test]
    fn missing_targets_is_none() {
        assert!(extract_targets(&json!({"nothing": []})).is_none());
    }
}
