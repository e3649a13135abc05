//! Error taxonomy for the scanning layer.
//!
//! Only `TransientUpstream` and `BrowserCrashed` are retryable; protocol
//! violations and extraction failures are surfaced as-is. NOT_FOUND is not
//! an error at all — see [`crate::types::ScanResult::not_found`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    /// 429, 5xx or a network-level timeout from the upstream site.
    #[error("transient upstream failure (status {status:?}): {message}")]
    TransientUpstream { status: Option<u16>, message: String },

    /// Malformed JSON, a GraphQL `errors` payload, or an otherwise
    /// unparseable response. Never retried.
    #[error("upstream protocol error: {0}")]
    Protocol(String),

    /// A browser navigation step failed or timed out.
    #[error("navigation step `{step}` failed: {message}")]
    Navigation { step: String, message: String },

    /// The browser instance died underneath us.
    #[error("browser crashed: {0}")]
    BrowserCrashed(String),

    /// A facet extractor could not produce its sub-record.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// A browser strategy was invoked without a browser page.
    #[error("browser strategy requires a browser page")]
    MissingBrowser,

    /// The scan was cancelled cooperatively.
    #[error("scan cancelled")]
    Cancelled,

    /// Invalid strategy or platform configuration detected at build time.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ScanError {
    /// Whether the strategy layer may retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScanError::TransientUpstream { .. } | ScanError::BrowserCrashed(_)
        )
    }

    pub(crate) fn transient(status: Option<u16>, message: impl Into<String>) -> Self {
        ScanError::TransientUpstream {
            status,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ScanError::transient(None, err.to_string())
        } else if err.is_decode() {
            ScanError::Protocol(err.to_string())
        } else {
            ScanError::transient(err.status().map(|s| s.as_u16()), err.to_string())
        }
    }
}
