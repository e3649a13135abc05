//! Monitor node: periodic re-scans of a fixed URL set, reporting status
//! changes between iterations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scanner::ScannerSet;
use serde_json::{json, Value};

use super::scan::{scan_targets, TargetRef};
use crate::kernel::browser_pool::BrowserPool;
use crate::kernel::workflow::context::NodeContext;
use crate::kernel::workflow::node::{NodeError, NodeErrorKind, NodeResult, WorkflowNode};

pub struct MonitorNode {
    scanners: Arc<dyn ScannerSet>,
    pool: Arc<BrowserPool>,
}

impl MonitorNode {
    pub fn new(scanners: Arc<dyn ScannerSet>, pool: Arc<BrowserPool>) -> Self {
        Self { scanners, pool }
    }
}

fn configured_urls(ctx: &NodeContext) -> Option<Vec<String>> {
    ctx.config_value("urls").and_then(Value::as_array).map(|urls| {
        urls.iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

fn status_of(row: &Value) -> String {
    match row["status"].as_str() {
        Some("success") => row["record"]["sale_status"]
            .as_str()
            .unwrap_or("unknown")
            .to_string(),
        Some(other) => other.to_string(),
        None => "unknown".to_string(),
    }
}

#[async_trait]
impl WorkflowNode for MonitorNode {
    fn node_type(&self) -> &'static str {
        "monitor"
    }

    async fn validate(&self, _input: &Value) -> Result<(), NodeError> {
        Ok(())
    }

    async fn execute(&self, _input: Value, ctx: &NodeContext) -> NodeResult {
        let Some(urls) = configured_urls(ctx) else {
            return NodeResult::fail(NodeError::new(
                NodeErrorKind::ValidationFailed,
                "monitor node needs a `urls` list in its config",
            ));
        };
        let Some(scanner) = self.scanners.get(ctx.platform) else {
            return NodeResult::fail(NodeError::internal(format!(
                "no scanner registered for {}",
                ctx.platform
            )));
        };

        let iterations = ctx.config_u64("iterations").unwrap_or(1).max(1);
        let interval = Duration::from_millis(ctx.config_u64("interval_ms").unwrap_or(60_000));
        let rotate_after = ctx
            .platform_config
            .as_ref()
            .map(|c| c.rotate_after_scans)
            .unwrap_or(0);
        let scan_delay = Duration::from_millis(
            ctx.platform_config
                .as_ref()
                .map(|c| c.rate_limit.scan_delay_ms)
                .unwrap_or(0),
        );

        let targets: Vec<TargetRef> = urls
            .iter()
            .map(|url| TargetRef {
                url: url.clone(),
                product_id: scanner.extract_product_id(url),
            })
            .collect();

        let mut previous: HashMap<String, String> = HashMap::new();
        let mut changes = Vec::new();
        let mut last_rows = Vec::new();

        for iteration in 0..iterations {
            if ctx.cancel.is_cancelled() {
                return NodeResult::fail(NodeError::new(
                    NodeErrorKind::Cancelled,
                    "job cancelled",
                ));
            }
            if iteration > 0 {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => {
                        return NodeResult::fail(NodeError::new(
                            NodeErrorKind::Cancelled,
                            "job cancelled",
                        ));
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }

            let rows = match scan_targets(
                &scanner,
                &self.pool,
                ctx,
                &targets,
                scan_delay,
                rotate_after,
            )
            .await
            {
                Ok(rows) => rows,
                Err(e) => return NodeResult::fail(e),
            };

            for row in &rows {
                let key = row["product_id"].as_str().unwrap_or_default().to_string();
                let status = status_of(row);
                if let Some(old) = previous.get(&key) {
                    if *old != status {
                        changes.push(json!({
                            "product_id": key,
                            "iteration": iteration,
                            "from": old,
                            "to": status,
                        }));
                    }
                }
                previous.insert(key, status);
            }
            last_rows = rows;
        }

        tracing::info!(
            job_id = %ctx.job_id,
            iterations,
            changes = changes.len(),
            "monitor finished"
        );

        NodeResult::ok(json!({
            "iterations": iterations,
            "changes": changes,
            "observations": last_rows,
        }))
    }
}
