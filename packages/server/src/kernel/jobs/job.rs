//! Job model: one enqueued workflow execution instance.

use chrono::{DateTime, Utc};
use scanner::Platform;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::new_job_id;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the state machine allows `self → to`.
    ///
    /// `running → pending` is invalid; terminal states accept nothing.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        match (self, to) {
            (JobStatus::Pending, JobStatus::Running) => true,
            (JobStatus::Pending, JobStatus::Cancelled) => true,
            (JobStatus::Running, JobStatus::Completed) => true,
            (JobStatus::Running, JobStatus::Failed) => true,
            (JobStatus::Running, JobStatus::Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// The error payload a failed job carries: message, failing node, time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobError {
    pub message: String,
    pub node_id: Option<String>,
    pub at: DateTime<Utc>,
}

impl JobError {
    pub fn new(message: impl Into<String>, node_id: Option<String>) -> Self {
        Self {
            message: message.into(),
            node_id,
            at: Utc::now(),
        }
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = new_job_id())]
    pub id: Uuid,

    // Core identity
    pub workflow_id: String,
    pub platform: Platform,

    /// Higher runs first within the platform.
    #[builder(default = 0)]
    pub priority: i32,

    #[builder(default)]
    pub status: JobStatus,

    /// Caller parameters, constrained by the workflow.
    #[builder(default = Value::Object(Map::new()))]
    pub params: Value,

    // Execution state
    #[builder(default, setter(strip_option))]
    pub current_node: Option<String>,
    #[builder(default = 0.0)]
    pub progress: f64,
    #[builder(default)]
    pub result: Map<String, Value>,
    #[builder(default, setter(strip_option))]
    pub error: Option<JobError>,

    // Timestamps
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,

    // Arbitrary caller metadata
    #[builder(default)]
    pub metadata: Map<String, Value>,
}

impl Job {
    /// Convenience constructor for an immediate job.
    pub fn new(workflow_id: &str, platform: Platform, priority: i32, params: Value) -> Self {
        Self::builder()
            .workflow_id(workflow_id.to_string())
            .platform(platform)
            .priority(priority)
            .params(params)
            .build()
    }

    /// Transition to `running`, stamping `started_at`.
    pub fn start(&mut self) {
        debug_assert!(self.status.can_transition_to(JobStatus::Running));
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Terminal success.
    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.progress = 1.0;
    }

    /// Terminal failure with the failing node id.
    pub fn fail(&mut self, message: impl Into<String>, node_id: Option<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(JobError::new(message, node_id.clone()));
        self.current_node = node_id;
        self.completed_at = Some(Utc::now());
    }

    /// Terminal cancellation.
    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Merge a node's output into the accumulated result under its node id.
    pub fn record_node_output(&mut self, node_id: &str, output: Value) {
        self.result.insert(node_id.to_string(), output);
        self.current_node = Some(node_id.to_string());
    }
}
