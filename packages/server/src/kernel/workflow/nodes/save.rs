//! Save node: appends result rows to the job's streaming result file.
//!
//! The worker opens the writer before execution and parks it in the job's
//! shared state; this node only appends. Rows keep their upstream status
//! (`success | failed | not_found`) so the file summary matches the scans.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::validate::extract_scans;
use super::RESULT_WRITER_KEY;
use crate::kernel::results::{RecordStatus, ResultWriter};
use crate::kernel::workflow::context::NodeContext;
use crate::kernel::workflow::node::{NodeError, NodeErrorKind, NodeResult, WorkflowNode};

pub struct SaveNode;

/// Rows to persist: comparisons when present, bare scans otherwise.
fn extract_rows(input: &Value) -> Option<Vec<Value>> {
    if let Some(rows) = input.get("comparisons").and_then(Value::as_array) {
        return Some(rows.clone());
    }
    if let Some(rows) = input.as_object().and_then(|map| {
        map.values()
            .find_map(|v| v.get("comparisons").and_then(Value::as_array))
    }) {
        return Some(rows.clone());
    }
    extract_scans(input).cloned()
}

fn record_status(row: &Value) -> RecordStatus {
    match row["status"].as_str() {
        Some("success") => RecordStatus::Success,
        Some("not_found") => RecordStatus::NotFound,
        _ => RecordStatus::Failed,
    }
}

#[async_trait]
impl WorkflowNode for SaveNode {
    fn node_type(&self) -> &'static str {
        "save"
    }

    async fn execute(&self, input: Value, ctx: &NodeContext) -> NodeResult {
        let Some(rows) = extract_rows(&input) else {
            return NodeResult::fail(NodeError::new(
                NodeErrorKind::ValidationFailed,
                "save input carries neither comparisons nor scans",
            ));
        };
        let Some(writer) = ctx.shared.get::<Mutex<ResultWriter>>(RESULT_WRITER_KEY) else {
            return NodeResult::fail(NodeError::internal(
                "no result writer in shared state (worker did not open one)",
            ));
        };

        let mut written = 0usize;
        {
            let mut writer = writer.lock().await;
            for row in rows {
                if ctx.cancel.is_cancelled() {
                    return NodeResult::fail(NodeError::new(
                        NodeErrorKind::Cancelled,
                        "job cancelled",
                    ));
                }
                let status = record_status(&row);
                if let Err(e) = writer.append(status, row).await {
                    return NodeResult::fail(NodeError::internal(format!(
                        "result append failed: {e}"
                    )));
                }
                written += 1;
            }
        }

        tracing::info!(job_id = %ctx.job_id, written, "results saved");
        NodeResult::ok(json!({ "written": written }))
    }
}

// The writer is shared state; Arc<Mutex<ResultWriter>> is what the worker
// inserts under RESULT_WRITER_KEY.
pub type SharedResultWriter = Arc<Mutex<ResultWriter>>;
