//! The workflow engine: typed-node DAG execution with context, retries,
//! timeouts and parallel fan-out.
//!
//! # Architecture
//!
//! ```text
//! WorkflowEngine.execute(job)
//!     │
//!     ├─► WorkflowLibrary        (definition lookup + validation)
//!     ├─► NodeFactory            (type string → WorkflowNode)
//!     ├─► JoinSet DAG scheduler  (producer counting, convergence dedup)
//!     │       └─► run_node: validate → execute (timeout) → retry policy
//!     └─► JobRepository          (persist after every node)
//! ```

pub mod context;
pub mod definition;
pub mod engine;
pub mod factory;
pub mod node;
pub mod nodes;
pub mod pipeline;

pub use context::{NodeContext, SharedState};
pub use definition::{
    DefinitionError, NodeDefinition, RetryPolicy, WorkflowDefinition, WorkflowLibrary,
};
pub use engine::{JobSignals, WorkflowEngine, DEFAULT_NODE_TIMEOUT};
pub use factory::NodeFactory;
pub use node::{NodeError, NodeErrorKind, NodeResult, WorkflowNode};
pub use nodes::{default_factory, NodeDeps, RESULT_WRITER_KEY};
pub use pipeline::{stage_fn, Pipeline, Stage, StageFn};
