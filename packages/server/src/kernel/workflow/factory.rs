//! Node factory registry: node type string → constructor.
//!
//! Factories are registered once at startup; resolving an unknown type is
//! a terminal job error, never a panic.

use std::collections::HashMap;
use std::sync::Arc;

use super::definition::NodeDefinition;
use super::node::{NodeError, WorkflowNode};

type NodeBuilder =
    Box<dyn Fn(&NodeDefinition) -> Result<Arc<dyn WorkflowNode>, NodeError> + Send + Sync>;

#[derive(Default)]
pub struct NodeFactory {
    builders: HashMap<String, NodeBuilder>,
}

impl NodeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder for a node type. Later registrations replace
    /// earlier ones.
    pub fn register<F>(&mut self, node_type: impl Into<String>, builder: F)
    where
        F: Fn(&NodeDefinition) -> Result<Arc<dyn WorkflowNode>, NodeError> + Send + Sync + 'static,
    {
        self.builders.insert(node_type.into(), Box::new(builder));
    }

    pub fn resolve(&self, definition: &NodeDefinition) -> Result<Arc<dyn WorkflowNode>, NodeError> {
        let builder = self.builders.get(&definition.node_type).ok_or_else(|| {
            NodeError::internal(format!(
                "no factory registered for node type {:?}",
                definition.node_type
            ))
        })?;
        builder(definition)
    }

    pub fn registered_types(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }
}
