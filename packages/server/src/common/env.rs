//! Environment-driven service configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use scanner::Platform;

/// Everything the process reads from the environment, in one place.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Backing-store connection URL.
    pub redis_url: String,
    /// Service name; tags the root tracing span and log routing.
    pub service_name: String,
    /// When set, logs go to `<LOG_DIR>/<SERVICE_NAME>.log` instead of
    /// stderr.
    pub log_dir: Option<String>,
    /// HTTP bind address.
    pub bind_addr: String,
    /// WebDriver endpoint for browser strategies.
    pub webdriver_url: String,
    /// Platform set this worker handles; `None` means all.
    pub worker_platforms: Option<Vec<Platform>>,
    /// Browser-pool size.
    pub browser_pool_size: usize,
    /// Worker poll interval.
    pub poll_interval: Duration,
    /// Platform-lock TTL.
    pub lock_ttl: Duration,
    /// Directory of platform configuration files.
    pub platform_config_dir: String,
    /// Directory of workflow definition files.
    pub workflow_config_dir: String,
    /// Root directory for result files.
    pub results_dir: String,
    /// Reference-data directory (one JSON file per platform).
    pub reference_dir: String,
    /// Optional webhook URL for job notifications.
    pub webhook_url: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let service_name =
            std::env::var("SERVICE_NAME").unwrap_or_else(|_| "shelfscan".to_string());
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let webdriver_url = std::env::var("WEBDRIVER_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:9515".to_string());

        let worker_platforms = match std::env::var("WORKER_PLATFORMS") {
            Ok(raw) if !raw.trim().is_empty() => Some(parse_platform_list(&raw)?),
            _ => None,
        };

        let browser_pool_size = std::env::var("BROWSER_POOL_SIZE")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("BROWSER_POOL_SIZE must be an integer")?
            .unwrap_or(4);

        let poll_interval = Duration::from_millis(
            std::env::var("POLL_INTERVAL_MS")
                .ok()
                .map(|v| v.parse::<u64>())
                .transpose()
                .context("POLL_INTERVAL_MS must be an integer")?
                .unwrap_or(1_000),
        );

        let lock_ttl = Duration::from_millis(
            std::env::var("LOCK_TTL_MS")
                .ok()
                .map(|v| v.parse::<u64>())
                .transpose()
                .context("LOCK_TTL_MS must be an integer")?
                .unwrap_or(600_000),
        );

        Ok(Self {
            redis_url,
            service_name,
            log_dir: std::env::var("LOG_DIR").ok().filter(|v| !v.is_empty()),
            bind_addr,
            webdriver_url,
            worker_platforms,
            browser_pool_size,
            poll_interval,
            lock_ttl,
            platform_config_dir: std::env::var("PLATFORM_CONFIG_DIR")
                .unwrap_or_else(|_| "config/platforms".to_string()),
            workflow_config_dir: std::env::var("WORKFLOW_CONFIG_DIR")
                .unwrap_or_else(|_| "config/workflows".to_string()),
            results_dir: std::env::var("RESULTS_DIR").unwrap_or_else(|_| "results".to_string()),
            reference_dir: std::env::var("REFERENCE_DIR")
                .unwrap_or_else(|_| "config/reference".to_string()),
            webhook_url: std::env::var("WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
        })
    }
}

/// Parse a comma-separated platform list (`WORKER_PLATFORMS` / `--platforms`).
pub fn parse_platform_list(raw: &str) -> Result<Vec<Platform>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Platform>()
                .with_context(|| format!("WORKER_PLATFORMS: unknown platform {s:?}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_list_parses_and_trims() {
        let platforms = parse_platform_list("oliveyoung, ably ,kurly").unwrap();
        assert_eq!(
            platforms,
            vec![Platform::Oliveyoung, Platform::Ably, Platform::Kurly]
        );
    }

    #[test]
    fn unknown_platform_in_list_is_an_error() {
        assert!(parse_platform_list("oliveyoung,amazon").is_err());
    }
}
