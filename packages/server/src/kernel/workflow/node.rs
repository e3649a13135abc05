//! The node abstraction: every unit of a workflow DAG implements
//! [`WorkflowNode`] and surfaces its outcome as a [`NodeResult`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::NodeContext;

/// Error taxonomy at the node layer. The engine decides retry behavior
/// from the kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeErrorKind {
    /// 429/5xx/network timeout that survived strategy-level retries.
    TransientUpstream,
    /// Shape violation in a scanned record; fails the job without retry.
    ValidationFailed,
    /// The engine-enforced node timeout fired.
    Timeout,
    /// GraphQL errors, malformed bodies; never retried.
    UpstreamProtocol,
    /// Backing store unavailable.
    Repository,
    /// The platform lock was lost mid-run.
    LockLost,
    /// The browser died; retried once on a fresh instance by the scan node.
    BrowserCrashed,
    /// Cooperative cancellation.
    Cancelled,
    /// Anything else.
    Internal,
}

impl NodeErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NodeErrorKind::TransientUpstream
                | NodeErrorKind::Timeout
                | NodeErrorKind::BrowserCrashed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct NodeError {
    pub kind: NodeErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl NodeError {
    pub fn new(kind: NodeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(NodeErrorKind::Internal, message)
    }
}

impl From<scanner::ScanError> for NodeError {
    fn from(err: scanner::ScanError) -> Self {
        use scanner::ScanError;
        let kind = match &err {
            ScanError::TransientUpstream { .. } => NodeErrorKind::TransientUpstream,
            ScanError::Protocol(_) => NodeErrorKind::UpstreamProtocol,
            ScanError::BrowserCrashed(_) => NodeErrorKind::BrowserCrashed,
            ScanError::Cancelled => NodeErrorKind::Cancelled,
            ScanError::Navigation { .. }
            | ScanError::Extraction(_)
            | ScanError::MissingBrowser
            | ScanError::Config(_) => NodeErrorKind::Internal,
        };
        NodeError::new(kind, err.to_string())
    }
}

impl From<crate::kernel::jobs::RepositoryError> for NodeError {
    fn from(err: crate::kernel::jobs::RepositoryError) -> Self {
        NodeError::new(NodeErrorKind::Repository, err.to_string())
    }
}

/// Tagged outcome of one node execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub success: bool,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
    /// Dynamic branch override; None follows the definition edges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_nodes: Option<Vec<String>>,
}

impl NodeResult {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            next_nodes: None,
        }
    }

    pub fn ok_with_next(output: Value, next_nodes: Vec<String>) -> Self {
        Self {
            success: true,
            output,
            error: None,
            next_nodes: Some(next_nodes),
        }
    }

    pub fn fail(error: NodeError) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error),
            next_nodes: None,
        }
    }
}

/// One unit of the DAG.
#[async_trait]
pub trait WorkflowNode: Send + Sync {
    fn node_type(&self) -> &'static str;

    /// Optional pre-execution shape check on the input. A failure here
    /// terminates the job without retries.
    async fn validate(&self, _input: &Value) -> Result<(), NodeError> {
        Ok(())
    }

    /// Execute against the input and context. Implementations must honor
    /// `ctx.cancel` for long-running I/O.
    async fn execute(&self, input: Value, ctx: &NodeContext) -> NodeResult;
}
