//! Sale-status facet extraction.
//!
//! Produces the platform-native status token; normalization into the
//! canonical vocabulary is the platform profile's job.

use async_trait::async_trait;
use serde_json::Value;

use super::{lookup, FacetExtractor};
use crate::config::FieldMap;
use crate::error::ScanError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFacet {
    pub native: String,
}

#[derive(Default)]
pub struct StatusExtractor;

#[async_trait]
impl FacetExtractor for StatusExtractor {
    type Facet = StatusFacet;

    async fn extract(&self, payload: &Value, map: &FieldMap) -> Result<StatusFacet, ScanError> {
        let value = lookup(payload, &map.sale_status).ok_or_else(|| {
            ScanError::Extraction(format!("missing sale status at {}", map.sale_status))
        })?;
        let native = match value {
            Value::String(s) => s.trim().to_string(),
            // Some platforms expose booleans ("isSoldOut": true).
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(ScanError::Extraction(format!(
                    "unexpected sale-status shape: {other}"
                )))
            }
        };
        Ok(StatusFacet { native })
    }
}
