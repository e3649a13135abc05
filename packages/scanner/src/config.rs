//! Per-platform static configuration.
//!
//! Platform configurations are JSON files, one per platform, loaded once at
//! startup. Strategy specs are a serde-tagged enum so an unknown strategy
//! type fails at load time rather than at dispatch time.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::navigation::NavStep;
use crate::types::{Platform, ScanMethod};

/// Static configuration for one platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub platform: Platform,
    pub display_name: String,
    pub base_url: String,
    /// Named endpoint templates, e.g. `product_detail`.
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    /// Ordered strategy specs; the registry picks the lowest priority
    /// number unless a caller names a strategy id.
    pub strategies: Vec<StrategySpec>,
    /// Maps strategy payload fields onto the normalized product record.
    pub field_map: FieldMap,
    #[serde(default)]
    pub rate_limit: RateLimitPolicy,
    #[serde(default)]
    pub concurrency: ConcurrencyLimits,
    /// Rotate the browser page after this many scans to bound memory.
    #[serde(default = "default_rotate_after")]
    pub rotate_after_scans: u32,
}

fn default_rotate_after() -> u32 {
    25
}

impl PlatformConfig {
    pub fn scan_method(&self) -> ScanMethod {
        // A platform whose preferred (lowest-priority-number) strategy is
        // browser-driven is scanned with the browser; everything else over
        // plain HTTP.
        self.strategies
            .iter()
            .min_by_key(|s| s.priority())
            .map(|s| match s {
                StrategySpec::Browser { .. } => ScanMethod::Browser,
                _ => ScanMethod::Api,
            })
            .unwrap_or(ScanMethod::Api)
    }
}

/// One extraction strategy. The `type` tag selects the concrete adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StrategySpec {
    Http {
        id: String,
        priority: u32,
        /// URL template; `{product_id}` is substituted per scan.
        url_template: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        response: ResponseKind,
        #[serde(default)]
        retry: UpstreamRetry,
        #[serde(default = "default_request_timeout_ms")]
        timeout_ms: u64,
        /// Fixed pre-request delay (upstream rate limit).
        #[serde(default)]
        delay_ms: u64,
    },
    Graphql {
        id: String,
        priority: u32,
        endpoint: String,
        query: String,
        #[serde(default)]
        operation_name: Option<String>,
        /// Variables template; string values containing `{product_id}` are
        /// substituted per scan.
        #[serde(default)]
        variables: Value,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        retry: UpstreamRetry,
        #[serde(default = "default_request_timeout_ms")]
        timeout_ms: u64,
        #[serde(default)]
        delay_ms: u64,
    },
    Browser {
        id: String,
        priority: u32,
        /// Navigation phase, interpreted in order.
        steps: Vec<NavStep>,
        /// Javascript evaluated after navigation; must return the raw
        /// payload object the extractors read.
        extract_script: String,
        #[serde(default = "default_step_timeout_ms")]
        step_timeout_ms: u64,
        #[serde(default)]
        delay_ms: u64,
    },
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_step_timeout_ms() -> u64 {
    15_000
}

impl StrategySpec {
    pub fn id(&self) -> &str {
        match self {
            StrategySpec::Http { id, .. }
            | StrategySpec::Graphql { id, .. }
            | StrategySpec::Browser { id, .. } => id,
        }
    }

    pub fn priority(&self) -> u32 {
        match self {
            StrategySpec::Http { priority, .. }
            | StrategySpec::Graphql { priority, .. }
            | StrategySpec::Browser { priority, .. } => *priority,
        }
    }
}

/// How an HTTP strategy body is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    #[default]
    Json,
    Html,
}

/// Strategy-level retry policy for 429/5xx/timeouts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpstreamRetry {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for UpstreamRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
        }
    }
}

/// Workflow-level pacing between scans on one platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Delay between consecutive scans within one job.
    pub scan_delay_ms: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self { scan_delay_ms: 200 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConcurrencyLimits {
    /// Upper bound on in-flight upstream requests within one scan node.
    pub max_parallel_requests: u32,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            max_parallel_requests: 1,
        }
    }
}

/// Field-mapping rules from a strategy payload onto the product record.
///
/// Values are JSON pointers (`/a/b/0`) into the strategy payload for
/// JSON-shaped payloads, or CSS selectors for HTML-shaped payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMap {
    pub name: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub original_price: Option<String>,
    #[serde(default)]
    pub discounted_price: Option<String>,
    pub sale_status: String,
    /// Extra payload fields carried into the record metadata map.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// All loaded platform configurations, keyed by platform.
#[derive(Debug, Clone, Default)]
pub struct PlatformConfigs {
    configs: HashMap<Platform, Arc<PlatformConfig>>,
}

impl PlatformConfigs {
    pub fn new(configs: impl IntoIterator<Item = PlatformConfig>) -> Self {
        Self {
            configs: configs
                .into_iter()
                .map(|c| (c.platform, Arc::new(c)))
                .collect(),
        }
    }

    /// Load every `*.json` file in a directory as one platform config.
    pub fn load_dir(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut configs = HashMap::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            let config: PlatformConfig = serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
            configs.insert(config.platform, Arc::new(config));
        }
        Ok(Self { configs })
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<PlatformConfig>> {
        self.configs.get(&platform).cloned()
    }

    pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.configs.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_config_json() -> &'static str {
        r#"{
            "platform": "hwahae",
            "display_name": "Hwahae",
            "base_url": "https://www.hwahae.co.kr",
            "strategies": [
                {
                    "type": "http",
                    "id": "detail-api",
                    "priority": 1,
                    "url_template": "https://api.hwahae.co.kr/products/{product_id}"
                }
            ],
            "field_map": {
                "name": "/product/name",
                "sale_status": "/product/status"
            }
        }"#
    }

    #[test]
    fn http_config_deserializes_with_defaults() {
        let config: PlatformConfig = serde_json::from_str(http_config_json()).unwrap();
        assert_eq!(config.platform, Platform::Hwahae);
        assert_eq!(config.scan_method(), ScanMethod::Api);
        assert_eq!(config.rotate_after_scans, 25);
        match &config.strategies[0] {
            StrategySpec::Http { retry, response, .. } => {
                assert_eq!(retry.max_attempts, 3);
                assert_eq!(*response, ResponseKind::Json);
            }
            other => panic!("expected http strategy, got {other:?}"),
        }
    }

    #[test]
    fn unknown_strategy_type_fails_at_load_time() {
        let raw = r#"{
            "platform": "ably",
            "display_name": "Ably",
            "base_url": "https://a-bly.com",
            "strategies": [{"type": "grpc", "id": "x", "priority": 1}],
            "field_map": {"name": "/n", "sale_status": "/s"}
        }"#;
        let err = serde_json::from_str::<PlatformConfig>(raw).unwrap_err();
        assert!(err.to_string().contains("unknown variant"));
    }

    #[test]
    fn browser_strategy_marks_platform_browser_scanned() {
        let raw = r#"{
            "platform": "oliveyoung",
            "display_name": "Olive Young",
            "base_url": "https://www.oliveyoung.co.kr",
            "strategies": [
                {
                    "type": "browser",
                    "id": "detail-dom",
                    "priority": 1,
                    "steps": [{"action": "navigate", "url": "https://www.oliveyoung.co.kr/store/goods/getGoodsDetail.do?goodsNo={product_id}"}],
                    "extract_script": "return {}"
                },
                {
                    "type": "http",
                    "id": "fallback",
                    "priority": 2,
                    "url_template": "https://www.oliveyoung.co.kr/api/{product_id}"
                }
            ],
            "field_map": {"name": "/name", "sale_status": "/status"}
        }"#;
        let config: PlatformConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.scan_method(), ScanMethod::Browser);
    }
}
