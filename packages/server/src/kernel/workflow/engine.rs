//! Workflow engine: executes a job's DAG with per-node retries, timeouts,
//! parallel fan-out and convergence.
//!
//! # Execution model
//!
//! Nodes run as tasks on a `JoinSet`. A node is spawned once every one of
//! its in-run producers has completed; a convergence node (one referenced
//! by several branches) is deduplicated by node id and runs exactly once.
//! A node triggered by a single producer receives that producer's output
//! directly; a convergence node receives a snapshot of the accumulated
//! result, so parallel siblings see consistent prior state and their
//! writes stay isolated until the join.
//!
//! Failure policy comes from the failing node's `stop_on_error`: true
//! cancels the siblings and fails the job; false lets surviving branches
//! run on while the failed chain is discharged without executing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use scanner::PlatformConfigs;

use super::context::{merge_config, NodeContext, SharedState};
use super::definition::{NodeDefinition, RetryPolicy, WorkflowLibrary};
use super::factory::NodeFactory;
use super::node::{NodeError, NodeErrorKind, NodeResult, WorkflowNode};
use crate::kernel::jobs::{Job, JobRepository, JobStatus};

pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(60);

/// Cooperative signals for one job execution.
#[derive(Clone, Default)]
pub struct JobSignals {
    /// External cancellation (API request or worker shutdown).
    pub cancel: CancellationToken,
    /// Tripped by the worker when the platform-lock heartbeat fails; the
    /// engine must stop mutating job state and fail the job.
    pub lock_lost: CancellationToken,
}

impl JobSignals {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct WorkflowEngine {
    factory: Arc<NodeFactory>,
    repo: Arc<dyn JobRepository>,
    library: Arc<WorkflowLibrary>,
    platform_configs: Arc<PlatformConfigs>,
}

impl WorkflowEngine {
    pub fn new(
        factory: Arc<NodeFactory>,
        repo: Arc<dyn JobRepository>,
        library: Arc<WorkflowLibrary>,
        platform_configs: Arc<PlatformConfigs>,
    ) -> Self {
        Self {
            factory,
            repo,
            library,
            platform_configs,
        }
    }

    pub fn library(&self) -> &Arc<WorkflowLibrary> {
        &self.library
    }

    /// Execute the job to a terminal state. The job is mutated in place;
    /// intermediate persists are best-effort, the caller owns the final
    /// save.
    pub async fn execute(&self, job: &mut Job, shared: SharedState, signals: &JobSignals) {
        let Some(definition) = self.library.get(&job.workflow_id).cloned() else {
            job.fail(format!("unknown workflow {:?}", job.workflow_id), None);
            return;
        };

        job.start();
        self.persist(job).await;

        let total_nodes = definition.reachable_from_start().len().max(1);
        let static_counts: HashMap<String, usize> = definition
            .producer_counts()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let mut remaining = static_counts.clone();
        let mut successful_producers: HashMap<String, usize> = HashMap::new();
        let mut scheduled: HashSet<String> = HashSet::new();
        let mut executed = 0usize;

        let mut tasks: JoinSet<(String, NodeResult)> = JoinSet::new();
        let mut ready: VecDeque<(String, Value)> =
            VecDeque::from([(definition.start_node.clone(), job.params.clone())]);

        loop {
            // Schedule everything currently ready.
            while let Some((node_id, input)) = ready.pop_front() {
                if !scheduled.insert(node_id.clone()) {
                    continue; // convergence dedup
                }
                let Some(node_def) = definition.nodes.get(&node_id).cloned() else {
                    self.abort_failed(
                        job,
                        &mut tasks,
                        signals,
                        format!("node {node_id:?} not in workflow"),
                        Some(node_id),
                    )
                    .await;
                    return;
                };
                let node = match self.factory.resolve(&node_def) {
                    Ok(node) => node,
                    Err(e) => {
                        self.abort_failed(job, &mut tasks, signals, e.message, Some(node_id))
                            .await;
                        return;
                    }
                };
                let ctx = self.build_context(job, &node_id, &node_def, &shared, signals);
                tasks.spawn(run_node(node, node_def, ctx, input, node_id));
            }

            let Some(joined) = tasks.join_next().await else {
                break; // DAG drained
            };

            let (node_id, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    self.abort_failed(
                        job,
                        &mut tasks,
                        signals,
                        format!("node task panicked: {e}"),
                        None,
                    )
                    .await;
                    return;
                }
            };

            // Lock loss and cancellation are checked between nodes.
            if signals.lock_lost.is_cancelled() {
                tasks.abort_all();
                // The job was dequeued by us and no re-acquirer will pick
                // it up again, so the record is still ours to finish; only
                // the result file is off limits.
                job.fail("platform lock lost during execution", Some(node_id));
                self.persist(job).await;
                return;
            }
            if signals.cancel.is_cancelled() || self.cancel_requested(job).await {
                tasks.abort_all();
                job.cancel();
                self.persist(job).await;
                return;
            }

            let node_def = &definition.nodes[&node_id];

            if result.success {
                executed += 1;
                job.record_node_output(&node_id, result.output.clone());
                job.progress = (executed as f64 / total_nodes as f64).min(1.0);
                self.persist(job).await;

                match result.next_nodes {
                    Some(overrides) => {
                        // Dynamic branch: bypass producer counting, dedup
                        // by node id via `scheduled`.
                        for target in overrides {
                            ready.push_back((target, result.output.clone()));
                        }
                    }
                    None => {
                        for successor in node_def.successors() {
                            let count = remaining
                                .get_mut(successor)
                                .map(|c| {
                                    *c = c.saturating_sub(1);
                                    *c
                                })
                                .unwrap_or(0);
                            *successful_producers
                                .entry(successor.to_string())
                                .or_default() += 1;
                            if count == 0 {
                                let single_producer =
                                    static_counts.get(successor).copied().unwrap_or(1) == 1;
                                let input = if single_producer {
                                    result.output.clone()
                                } else {
                                    Value::Object(job.result.clone())
                                };
                                ready.push_back((successor.to_string(), input));
                            }
                        }
                    }
                }
            } else {
                let error = result
                    .error
                    .unwrap_or_else(|| NodeError::internal("node failed without error"));

                if error.kind == NodeErrorKind::Cancelled {
                    tasks.abort_all();
                    job.cancel();
                    self.persist(job).await;
                    return;
                }
                if error.kind == NodeErrorKind::LockLost {
                    tasks.abort_all();
                    job.fail(error.message, Some(node_id));
                    self.persist(job).await;
                    return;
                }

                if node_def.stop_on_error {
                    self.abort_failed(job, &mut tasks, signals, error.message, Some(node_id))
                        .await;
                    return;
                }

                // Branch-local failure: record it, then discharge the
                // failed chain so convergence nodes with surviving
                // producers can still run.
                tracing::warn!(
                    job_id = %job.id,
                    node_id = %node_id,
                    error = %error,
                    "branch failed, continuing (stop_on_error=false)"
                );
                job.record_node_output(
                    &node_id,
                    json!({"success": false, "error": error}),
                );
                self.persist(job).await;

                let mut discharge: VecDeque<&str> =
                    node_def.successors().into_iter().collect();
                while let Some(successor) = discharge.pop_front() {
                    let count = remaining
                        .get_mut(successor)
                        .map(|c| {
                            *c = c.saturating_sub(1);
                            *c
                        })
                        .unwrap_or(0);
                    if count == 0 && !scheduled.contains(successor) {
                        let successes = successful_producers
                            .get(successor)
                            .copied()
                            .unwrap_or(0);
                        if successes > 0 {
                            ready.push_back((
                                successor.to_string(),
                                Value::Object(job.result.clone()),
                            ));
                        } else if let Some(def) = definition.nodes.get(successor) {
                            // The whole chain above this node failed; it
                            // never runs, and its own successors discharge.
                            scheduled.insert(successor.to_string());
                            discharge.extend(def.successors());
                        }
                    }
                }
            }
        }

        match job.status {
            JobStatus::Running => {
                job.complete();
                self.persist(job).await;
            }
            _ => {}
        }
    }

    fn build_context(
        &self,
        job: &Job,
        node_id: &str,
        node_def: &NodeDefinition,
        shared: &SharedState,
        signals: &JobSignals,
    ) -> NodeContext {
        NodeContext {
            job_id: job.id,
            workflow_id: job.workflow_id.clone(),
            node_id: node_id.to_string(),
            config: merge_config(&node_def.config, &job.params),
            params: job.params.clone(),
            platform: job.platform,
            platform_config: self.platform_configs.get(job.platform),
            shared: shared.clone(),
            cancel: signals.cancel.clone(),
        }
    }

    async fn cancel_requested(&self, job: &Job) -> bool {
        self.repo.cancel_requested(job.id).await.unwrap_or(false)
    }

    async fn abort_failed(
        &self,
        job: &mut Job,
        tasks: &mut JoinSet<(String, NodeResult)>,
        signals: &JobSignals,
        message: String,
        node_id: Option<String>,
    ) {
        signals.cancel.cancel();
        tasks.abort_all();
        job.fail(message, node_id);
        self.persist(job).await;
    }

    async fn persist(&self, job: &Job) {
        if let Err(e) = self.repo.save(job).await {
            tracing::warn!(job_id = %job.id, error = %e, "failed to persist job state");
        }
    }
}

/// Run one node: validate hook, then execute with timeout and retry.
async fn run_node(
    node: Arc<dyn WorkflowNode>,
    node_def: NodeDefinition,
    ctx: NodeContext,
    input: Value,
    node_id: String,
) -> (String, NodeResult) {
    if let Err(e) = node.validate(&input).await {
        tracing::warn!(node_id = %node_id, error = %e, "node input validation failed");
        return (node_id, NodeResult::fail(e));
    }

    let retry = node_def.retry.unwrap_or(RetryPolicy {
        max_attempts: 1,
        backoff_ms: 0,
    });
    let max_attempts = retry.max_attempts.max(1);
    let timeout = node_def
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_NODE_TIMEOUT);

    let mut last = NodeResult::fail(NodeError::internal("node never executed"));
    for attempt in 1..=max_attempts {
        if attempt > 1 {
            tokio::time::sleep(Duration::from_millis(
                retry.backoff_ms * u64::from(attempt - 1),
            ))
            .await;
            tracing::debug!(node_id = %node_id, attempt, "retrying node");
        }
        if ctx.cancel.is_cancelled() {
            return (
                node_id,
                NodeResult::fail(NodeError::new(NodeErrorKind::Cancelled, "job cancelled")),
            );
        }

        // Each attempt gets a child token so a fired timeout aborts the
        // node's in-flight I/O without touching the job-level token.
        let attempt_token = ctx.cancel.child_token();
        let attempt_ctx = NodeContext {
            cancel: attempt_token.clone(),
            ..ctx.clone()
        };

        last = match tokio::time::timeout(timeout, node.execute(input.clone(), &attempt_ctx)).await
        {
            Ok(result) => result,
            Err(_) => {
                attempt_token.cancel();
                NodeResult::fail(NodeError::new(
                    NodeErrorKind::Timeout,
                    format!("node timed out after {}ms", timeout.as_millis()),
                ))
            }
        };

        if last.success {
            return (node_id, last);
        }
        let retryable = last
            .error
            .as_ref()
            .is_some_and(|e| e.kind.is_retryable());
        if !retryable {
            return (node_id, last);
        }
    }

    (node_id, last)
}
