//! GraphQL extraction strategy.
//!
//! Transport failures (429/5xx/timeouts) retry like the HTTP strategy; a
//! response carrying a GraphQL `errors` array is a protocol error and is
//! never retried.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::http::send_with_retry;
use super::{ScanStrategy, StrategyPayload};
use crate::browser::BrowserPage;
use crate::config::UpstreamRetry;
use crate::error::ScanError;
use crate::navigation::render_template;

pub struct GraphqlStrategy {
    pub(crate) id: String,
    pub(crate) priority: u32,
    pub(crate) endpoint: String,
    pub(crate) query: String,
    pub(crate) operation_name: Option<String>,
    pub(crate) variables: Value,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) retry: UpstreamRetry,
    pub(crate) timeout: Duration,
    pub(crate) delay: Duration,
    pub(crate) client: reqwest::Client,
}

#[async_trait]
impl ScanStrategy for GraphqlStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn requires_browser(&self) -> bool {
        false
    }

    async fn fetch(
        &self,
        product_id: &str,
        _page: Option<&mut (dyn BrowserPage + '_)>,
        cancel: &CancellationToken,
    ) -> Result<StrategyPayload, ScanError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut body = json!({
            "query": self.query,
            "variables": substitute(self.variables.clone(), product_id),
        });
        if let Some(op) = &self.operation_name {
            body["operationName"] = Value::String(op.clone());
        }

        let response = send_with_retry(&self.retry, cancel, || {
            let mut request = self
                .client
                .post(&self.endpoint)
                .timeout(self.timeout)
                .json(&body);
            for (name, value) in &self.headers {
                request = request.header(name, value);
            }
            request
        })
        .await?;

        let Some(response) = response else {
            return Ok(StrategyPayload::not_found());
        };

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| ScanError::Protocol(format!("invalid graphql body: {e}")))?;

        if let Some(errors) = envelope.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                return Err(ScanError::Protocol(format!(
                    "graphql errors: {}",
                    Value::Array(errors.clone())
                )));
            }
        }

        let data = envelope
            .get("data")
            .cloned()
            .ok_or_else(|| ScanError::Protocol("graphql response without data".to_string()))?;

        Ok(StrategyPayload::json(data))
    }
}

/// Substitute `{product_id}` in every string leaf of the variables value.
fn substitute(value: Value, product_id: &str) -> Value {
    match value {
        Value::String(s) => Value::String(render_template(&s, product_id)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| substitute(v, product_id))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, substitute(v, product_id)))
                .collect(),
        ),
        other => other,
    }
}
