//! Compare node: diffs each scanned record against its authoritative row.
//!
//! Internally a typed two-stage pipeline (pair with reference, then diff);
//! the engine still sees a single node over the JSON map.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::validate::extract_scans;
use crate::kernel::compare::ComparatorSet;
use crate::kernel::reference::{ReferenceProduct, ReferenceStore};
use crate::kernel::workflow::context::NodeContext;
use crate::kernel::workflow::node::{NodeError, NodeErrorKind, NodeResult, WorkflowNode};
use crate::kernel::workflow::pipeline::{Pipeline, Stage};

pub struct CompareNode {
    reference: Arc<dyn ReferenceStore>,
    comparators: Arc<ComparatorSet>,
}

impl CompareNode {
    pub fn new(reference: Arc<dyn ReferenceStore>, comparators: Arc<ComparatorSet>) -> Self {
        Self {
            reference,
            comparators,
        }
    }
}

/// Stage 1: pair each scan row with its reference row.
struct PairStage {
    reference: Arc<dyn ReferenceStore>,
}

#[async_trait]
impl Stage<Vec<Value>, Vec<(Value, Option<ReferenceProduct>)>> for PairStage {
    async fn run(
        &self,
        rows: Vec<Value>,
        ctx: &NodeContext,
    ) -> Result<Vec<(Value, Option<ReferenceProduct>)>, NodeError> {
        let mut paired = Vec::with_capacity(rows.len());
        for row in rows {
            let reference = match row["product_id"].as_str() {
                Some(id) => self
                    .reference
                    .get(ctx.platform, id)
                    .await
                    .map_err(|e| NodeError::new(NodeErrorKind::Repository, e.to_string()))?,
                None => None,
            };
            paired.push((row, reference));
        }
        Ok(paired)
    }
}

/// Stage 2: run the comparator set over each successful pair.
struct DiffStage {
    comparators: Arc<ComparatorSet>,
}

#[async_trait]
impl Stage<Vec<(Value, Option<ReferenceProduct>)>, Vec<Value>> for DiffStage {
    async fn run(
        &self,
        pairs: Vec<(Value, Option<ReferenceProduct>)>,
        _ctx: &NodeContext,
    ) -> Result<Vec<Value>, NodeError> {
        let mut comparisons = Vec::with_capacity(pairs.len());
        for (row, reference) in pairs {
            let status = row["status"].as_str().unwrap_or("failed").to_string();
            let mut out = json!({
                "product_id": row["product_id"],
                "url": row["url"],
                "status": status,
                "scanned_at": row["scanned_at"],
            });

            if status != "success" {
                if let Some(error) = row.get("error") {
                    out["error"] = error.clone();
                }
                comparisons.push(out);
                continue;
            }

            let Some(reference) = reference else {
                out["matched"] = json!(false);
                out["missing_reference"] = json!(true);
                comparisons.push(out);
                continue;
            };

            let record = serde_json::from_value(row["record"].clone()).map_err(|e| {
                NodeError::new(
                    NodeErrorKind::ValidationFailed,
                    format!("unparseable scanned record: {e}"),
                )
            })?;
            let outcome = self.comparators.compare(&reference, &record);
            out["matched"] = json!(outcome.matched);
            out["fields"] = serde_json::to_value(&outcome.fields)
                .map_err(|e| NodeError::internal(e.to_string()))?;
            comparisons.push(out);
        }
        Ok(comparisons)
    }
}

#[async_trait]
impl WorkflowNode for CompareNode {
    fn node_type(&self) -> &'static str {
        "compare"
    }

    async fn execute(&self, input: Value, ctx: &NodeContext) -> NodeResult {
        let Some(scans) = extract_scans(&input) else {
            return NodeResult::fail(NodeError::new(
                NodeErrorKind::ValidationFailed,
                "compare input carries no scans list",
            ));
        };

        let pipeline = Pipeline::new(PairStage {
            reference: self.reference.clone(),
        })
        .then(DiffStage {
            comparators: self.comparators.clone(),
        });

        match pipeline.run(scans.clone(), ctx).await {
            Ok(comparisons) => {
                let matched = comparisons
                    .iter()
                    .filter(|c| c["matched"] == true)
                    .count();
                NodeResult::ok(json!({
                    "comparisons": comparisons,
                    "matched": matched,
                }))
            }
            Err(e) => NodeResult::fail(e),
        }
    }
}
