//! Per-invocation node context and the per-job shared-state map.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use scanner::{Platform, PlatformConfig};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Cross-node communication within a single job, outside the merged
/// result: typed values (a browser page guard, an open result writer) that
/// cannot live in JSON. Best-effort only — never persisted across worker
/// restarts.
#[derive(Clone, Default)]
pub struct SharedState {
    values: Arc<Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: Arc<T>) {
        self.values.lock().unwrap().insert(key.into(), value);
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.values
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .and_then(|v| v.downcast::<T>().ok())
    }

    pub fn remove(&self, key: &str) {
        self.values.lock().unwrap().remove(key);
    }
}

/// Everything a node sees for one invocation. Immutable to the node except
/// for the shared-state map.
#[derive(Clone)]
pub struct NodeContext {
    pub job_id: Uuid,
    pub workflow_id: String,
    pub node_id: String,
    /// Node configuration merged over the job parameters (node config
    /// wins on key conflicts).
    pub config: Map<String, Value>,
    /// Snapshot of the job's caller parameters.
    pub params: Value,
    pub platform: Platform,
    pub platform_config: Option<Arc<PlatformConfig>>,
    pub shared: SharedState,
    pub cancel: CancellationToken,
}

impl NodeContext {
    /// Config lookup helper: node config first, then job params.
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key).or_else(|| self.params.get(key))
    }

    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config_value(key).and_then(Value::as_u64)
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config_value(key).and_then(Value::as_str)
    }
}

/// Merge node configuration over job params into the context config map.
pub fn merge_config(node_config: &Map<String, Value>, params: &Value) -> Map<String, Value> {
    let mut merged = Map::new();
    if let Value::Object(params) = params {
        for (k, v) in params {
            merged.insert(k.clone(), v.clone());
        }
    }
    for (k, v) in node_config {
        merged.insert(k.clone(), v.clone());
    }
    merged
}
