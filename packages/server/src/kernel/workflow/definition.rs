//! Workflow definitions: a named DAG of typed nodes, loaded from JSON
//! configuration and validated before any job can reference it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub start_node: String,
    pub nodes: HashMap<String, NodeDefinition>,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Matches a registered node factory.
    #[serde(rename = "type")]
    pub node_type: String,
    pub name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Single successor; sugar for a one-element `next_nodes`.
    #[serde(default)]
    pub next_node: Option<String>,
    /// Parallel successor set; takes precedence over `next_node`.
    #[serde(default)]
    pub next_nodes: Vec<String>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// On a branch failure: cancel siblings and fail the job (true), or let
    /// surviving branches run on (false).
    #[serde(default = "default_stop_on_error")]
    pub stop_on_error: bool,
}

fn default_stop_on_error() -> bool {
    true
}

impl NodeDefinition {
    /// The effective successor set: `next_nodes`, else `[next_node]`,
    /// else empty (chain terminates).
    pub fn successors(&self) -> Vec<&str> {
        if !self.next_nodes.is_empty() {
            self.next_nodes.iter().map(String::as_str).collect()
        } else {
            self.next_node.as_deref().into_iter().collect()
        }
    }
}

/// Per-node retry policy: `max_attempts` bounds total attempts, delay
/// between attempts is linear (`backoff_ms * attempt_index`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DefinitionError {
    #[error("workflow {workflow}: start node {start:?} does not exist")]
    MissingStart { workflow: String, start: String },

    #[error("workflow {workflow}: node {node:?} references unknown successor {successor:?}")]
    MissingSuccessor {
        workflow: String,
        node: String,
        successor: String,
    },

    #[error("workflow {workflow}: unreachable nodes: {nodes:?}")]
    UnreachableNodes { workflow: String, nodes: Vec<String> },
}

impl WorkflowDefinition {
    /// Structural validation: the start node exists, every referenced
    /// successor exists, and no node is unreachable from the start.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if !self.nodes.contains_key(&self.start_node) {
            return Err(DefinitionError::MissingStart {
                workflow: self.id.clone(),
                start: self.start_node.clone(),
            });
        }

        for (node_id, node) in &self.nodes {
            for successor in node.successors() {
                if !self.nodes.contains_key(successor) {
                    return Err(DefinitionError::MissingSuccessor {
                        workflow: self.id.clone(),
                        node: node_id.clone(),
                        successor: successor.to_string(),
                    });
                }
            }
        }

        let reachable = self.reachable_from_start();
        let mut unreachable: Vec<String> = self
            .nodes
            .keys()
            .filter(|id| !reachable.contains(id.as_str()))
            .cloned()
            .collect();
        if !unreachable.is_empty() {
            unreachable.sort();
            return Err(DefinitionError::UnreachableNodes {
                workflow: self.id.clone(),
                nodes: unreachable,
            });
        }

        Ok(())
    }

    /// Nodes reachable along definition edges from the start node.
    pub fn reachable_from_start(&self) -> HashSet<&str> {
        let mut reachable = HashSet::new();
        let mut frontier = VecDeque::from([self.start_node.as_str()]);
        while let Some(id) = frontier.pop_front() {
            if !reachable.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(id) {
                frontier.extend(node.successors());
            }
        }
        reachable
    }

    /// Static producer counts over the reachable subgraph, used by the
    /// engine to run a convergence node only after all its producers.
    pub fn producer_counts(&self) -> HashMap<&str, usize> {
        let reachable = self.reachable_from_start();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for id in &reachable {
            if let Some(node) = self.nodes.get(*id) {
                for successor in node.successors() {
                    *counts.entry(successor).or_default() += 1;
                }
            }
        }
        counts
    }
}

/// All loaded workflow definitions, keyed by workflow id.
#[derive(Debug, Clone, Default)]
pub struct WorkflowLibrary {
    workflows: HashMap<String, WorkflowDefinition>,
}

impl WorkflowLibrary {
    pub fn new(
        definitions: impl IntoIterator<Item = WorkflowDefinition>,
    ) -> Result<Self, DefinitionError> {
        let mut workflows = HashMap::new();
        for definition in definitions {
            definition.validate()?;
            workflows.insert(definition.id.clone(), definition);
        }
        Ok(Self { workflows })
    }

    /// Load every `*.json` file in a directory as one workflow.
    pub fn load_dir(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut definitions = Vec::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            let definition: WorkflowDefinition = serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
            definitions.push(definition);
        }
        Ok(Self::new(definitions)?)
    }

    pub fn get(&self, id: &str) -> Option<&WorkflowDefinition> {
        self.workflows.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
