//! Notify node: emits a structured job event through the notifier seam.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::kernel::notify::{Notifier, NotifyEvent};
use crate::kernel::workflow::context::NodeContext;
use crate::kernel::workflow::node::{NodeResult, WorkflowNode};

pub struct NotifyNode {
    notifier: Arc<dyn Notifier>,
}

impl NotifyNode {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl WorkflowNode for NotifyNode {
    fn node_type(&self) -> &'static str {
        "notify"
    }

    async fn execute(&self, input: Value, ctx: &NodeContext) -> NodeResult {
        let kind = ctx
            .config_str("event")
            .unwrap_or("workflow_progress")
            .to_string();

        let event = NotifyEvent {
            job_id: ctx.job_id,
            workflow_id: ctx.workflow_id.clone(),
            platform: ctx.platform,
            kind: kind.clone(),
            payload: input,
        };

        match self.notifier.notify(event).await {
            Ok(()) => NodeResult::ok(json!({ "notified": true, "event": kind })),
            // Notification failure is not worth failing a scan job over.
            Err(e) => {
                tracing::warn!(job_id = %ctx.job_id, error = %e, "notification failed");
                NodeResult::ok(json!({ "notified": false, "event": kind, "error": e.to_string() }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::notify::RecordingNotifier;
    use crate::kernel::workflow::context::SharedState;
    use scanner::Platform;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    #[tokio::test]
    async fn event_carries_the_input_payload() {
        let notifier = Arc::new(RecordingNotifier::new());
        let node = NotifyNode::new(notifier.clone());
        let mut config = serde_json::Map::new();
        config.insert("event".to_string(), json!("job_completed"));
        let ctx = NodeContext {
            job_id: Uuid::now_v7(),
            workflow_id: "wf".to_string(),
            node_id: "notify".to_string(),
            config,
            params: json!({}),
            platform: Platform::Oliveyoung,
            platform_config: None,
            shared: SharedState::new(),
            cancel: CancellationToken::new(),
        };

        let result = node.execute(json!({"written": 3}), &ctx).await;
        assert!(result.success);
        let events = notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "job_completed");
        assert_eq!(events[0].payload["written"], 3);
    }
}
