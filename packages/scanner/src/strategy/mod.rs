//! Extraction strategies: HTTP, GraphQL and browser adapters that reduce a
//! product reference to a raw JSON payload for the extraction facade.

mod browser;
mod graphql;
mod http;

pub use browser::BrowserStrategy;
pub use graphql::GraphqlStrategy;
pub use http::HttpStrategy;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::browser::BrowserPage;
use crate::config::{FieldMap, StrategySpec};
use crate::error::ScanError;

/// The raw result of one strategy fetch.
#[derive(Debug, Clone)]
pub struct StrategyPayload {
    pub value: Value,
    /// URL the fetch settled on, where the transport exposes redirects.
    pub final_url: Option<String>,
    /// The transport observed an HTTP 404.
    pub http_not_found: bool,
    /// The payload is already keyed canonically (the strategy resolved the
    /// platform field map itself, e.g. CSS selectors over an HTML body).
    pub canonical: bool,
}

impl StrategyPayload {
    pub fn json(value: Value) -> Self {
        Self {
            value,
            final_url: None,
            http_not_found: false,
            canonical: false,
        }
    }

    pub fn not_found() -> Self {
        Self {
            value: Value::Null,
            final_url: None,
            http_not_found: true,
            canonical: false,
        }
    }
}

/// A concrete extraction strategy.
#[async_trait]
pub trait ScanStrategy: Send + Sync {
    fn id(&self) -> &str;

    fn priority(&self) -> u32;

    fn requires_browser(&self) -> bool;

    async fn fetch(
        &self,
        product_id: &str,
        page: Option<&mut (dyn BrowserPage + '_)>,
        cancel: &CancellationToken,
    ) -> Result<StrategyPayload, ScanError>;
}

/// Compile a strategy spec into its concrete adapter.
///
/// Unknown strategy types never reach this point: `StrategySpec` is a
/// tagged enum, so they fail when the platform configuration is
/// deserialized.
pub fn build_strategy(
    spec: &StrategySpec,
    field_map: Arc<FieldMap>,
    client: reqwest::Client,
) -> Arc<dyn ScanStrategy> {
    use std::time::Duration;

    match spec {
        StrategySpec::Http {
            id,
            priority,
            url_template,
            headers,
            response,
            retry,
            timeout_ms,
            delay_ms,
        } => Arc::new(HttpStrategy {
            id: id.clone(),
            priority: *priority,
            url_template: url_template.clone(),
            headers: headers.clone(),
            response: *response,
            retry: *retry,
            timeout: Duration::from_millis(*timeout_ms),
            delay: Duration::from_millis(*delay_ms),
            field_map,
            client,
        }),
        StrategySpec::Graphql {
            id,
            priority,
            endpoint,
            query,
            operation_name,
            variables,
            headers,
            retry,
            timeout_ms,
            delay_ms,
        } => Arc::new(GraphqlStrategy {
            id: id.clone(),
            priority: *priority,
            endpoint: endpoint.clone(),
            query: query.clone(),
            operation_name: operation_name.clone(),
            variables: variables.clone(),
            headers: headers.clone(),
            retry: *retry,
            timeout: Duration::from_millis(*timeout_ms),
            delay: Duration::from_millis(*delay_ms),
            client,
        }),
        StrategySpec::Browser {
            id,
            priority,
            steps,
            extract_script,
            step_timeout_ms,
            delay_ms,
        } => Arc::new(BrowserStrategy {
            id: id.clone(),
            priority: *priority,
            steps: steps.clone(),
            extract_script: extract_script.clone(),
            step_timeout: Duration::from_millis(*step_timeout_ms),
            delay: Duration::from_millis(*delay_ms),
        }),
    }
}
