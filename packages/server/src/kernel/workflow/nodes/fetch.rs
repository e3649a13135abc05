//! Fetch node: pulls the target list from the reference store.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::kernel::reference::ReferenceStore;
use crate::kernel::workflow::context::NodeContext;
use crate::kernel::workflow::node::{NodeError, NodeErrorKind, NodeResult, WorkflowNode};

pub struct FetchTargetsNode {
    reference: Arc<dyn ReferenceStore>,
}

impl FetchTargetsNode {
    pub fn new(reference: Arc<dyn ReferenceStore>) -> Self {
        Self { reference }
    }
}

#[async_trait]
impl WorkflowNode for FetchTargetsNode {
    fn node_type(&self) -> &'static str {
        "fetch"
    }

    async fn execute(&self, _input: Value, ctx: &NodeContext) -> NodeResult {
        let limit = ctx.config_u64("limit").map(|n| n as usize);

        let targets = match self.reference.fetch_targets(ctx.platform, limit).await {
            Ok(targets) => targets,
            Err(e) => {
                return NodeResult::fail(NodeError::new(NodeErrorKind::Repository, e.to_string()))
            }
        };

        tracing::info!(
            job_id = %ctx.job_id,
            platform = %ctx.platform,
            count = targets.len(),
            "fetched scan targets"
        );

        match serde_json::to_value(&targets) {
            Ok(targets) => NodeResult::ok(json!({ "targets": targets })),
            Err(e) => NodeResult::fail(NodeError::internal(e.to_string())),
        }
    }
}
