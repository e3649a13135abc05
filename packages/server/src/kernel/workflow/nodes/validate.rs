//! Validate node: shape checks over scanned records.
//!
//! A violation is a `ValidationFailed` node error, which the engine never
//! retries; the job fails with the violation list in the error details.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::kernel::workflow::context::NodeContext;
use crate::kernel::workflow::node::{NodeError, NodeErrorKind, NodeResult, WorkflowNode};

pub struct ValidateNode;

/// Find the scan rows in the node input (direct output or accumulated map).
pub(crate) fn extract_scans(input: &Value) -> Option<&Vec<Value>> {
    if let Some(scans) = input.get("scans").and_then(Value::as_array) {
        return Some(scans);
    }
    input.as_object().and_then(|map| {
        map.values()
            .find_map(|v| v.get("scans").and_then(Value::as_array))
    })
}

fn check_record(row: &Value, violations: &mut Vec<String>) {
    let product_id = row["product_id"].as_str().unwrap_or("?");
    let Some(record) = row.get("record") else {
        violations.push(format!("{product_id}: success row without record"));
        return;
    };

    match record.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => {}
        _ => violations.push(format!("{product_id}: empty product name")),
    }

    let price = |key: &str| record.get(key).and_then(Value::as_i64);
    let original = price("original_price");
    let discounted = price("discounted_price");
    if let Some(p) = original {
        if p < 0 {
            violations.push(format!("{product_id}: negative original price {p}"));
        }
    }
    if let Some(p) = discounted {
        if p < 0 {
            violations.push(format!("{product_id}: negative discounted price {p}"));
        }
    }
    if let (Some(original), Some(discounted)) = (original, discounted) {
        if discounted > original {
            violations.push(format!(
                "{product_id}: discounted price {discounted} above original {original}"
            ));
        }
    }

    if let Some(url) = record.get("thumbnail_url").and_then(Value::as_str) {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            violations.push(format!("{product_id}: thumbnail is not an http url"));
        }
    }

    match record.get("sale_status").and_then(Value::as_str) {
        Some("on_sale" | "sold_out" | "off_sale") => {}
        other => violations.push(format!(
            "{product_id}: sale status outside canonical set: {other:?}"
        )),
    }
}

#[async_trait]
impl WorkflowNode for ValidateNode {
    fn node_type(&self) -> &'static str {
        "validate"
    }

    async fn execute(&self, input: Value, ctx: &NodeContext) -> NodeResult {
        let Some(scans) = extract_scans(&input) else {
            return NodeResult::fail(NodeError::new(
                NodeErrorKind::ValidationFailed,
                "validate input carries no scans list",
            ));
        };

        let mut violations = Vec::new();
        for row in scans {
            if row["status"] == "success" {
                check_record(row, &mut violations);
            }
        }

        if !violations.is_empty() {
            tracing::warn!(
                job_id = %ctx.job_id,
                count = violations.len(),
                "scanned records failed shape validation"
            );
            return NodeResult::fail(
                NodeError::new(
                    NodeErrorKind::ValidationFailed,
                    format!("{} scanned records failed validation", violations.len()),
                )
                .with_details(json!(violations)),
            );
        }

        NodeResult::ok(json!({ "scans": scans, "validated": scans.len() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::workflow::context::SharedState;
    use scanner::Platform;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn ctx() -> NodeContext {
        NodeContext {
            job_id: Uuid::now_v7(),
            workflow_id: "wf".to_string(),
            node_id: "validate".to_string(),
            config: Default::default(),
            params: json!({}),
            platform: Platform::Kurly,
            platform_config: None,
            shared: SharedState::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn good_row() -> Value {
        json!({
            "product_id": "1",
            "status": "success",
            "record": {
                "name": "Milk",
                "original_price": 3000,
                "discounted_price": 2500,
                "sale_status": "on_sale"
            }
        })
    }

    #[tokio::test]
    async fn clean_scans_pass_through() {
        let result = ValidateNode
            .execute(json!({"scans": [good_row()]}), &ctx())
            .await;
        assert!(result.success);
        assert_eq!(result.output["validated"], 1);
    }

    #[tokio::test]
    async fn not_found_rows_are_not_validated() {
        let rows = json!({"scans": [{"product_id": "2", "status": "not_found"}]});
        assert!(ValidateNode.execute(rows, &ctx()).await.success);
    }

    #[tokio::test]
    async fn inverted_prices_fail_validation() {
        let mut row = good_row();
        row["record"]["discounted_price"] = json!(9_999_999);
        let result = ValidateNode.execute(json!({"scans": [row]}), &ctx()).await;
        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.kind, NodeErrorKind::ValidationFailed);
        assert!(error.details.unwrap().to_string().contains("above original"));
    }

    #[tokio::test]
    async fn non_canonical_status_fails_validation() {
        let mut row = good_row();
        row["record"]["sale_status"] = json!("SELLING");
        let result = ValidateNode.execute(json!({"scans": [row]}), &ctx()).await;
        assert!(!result.success);
    }
}
