//! Price facet extraction.

use async_trait::async_trait;
use serde_json::Value;

use super::{lookup, FacetExtractor};
use crate::config::FieldMap;
use crate::error::ScanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceFacet {
    pub original: Option<i64>,
    pub discounted: Option<i64>,
}

#[derive(Default)]
pub struct PriceExtractor;

#[async_trait]
impl FacetExtractor for PriceExtractor {
    type Facet = PriceFacet;

    async fn extract(&self, payload: &Value, map: &FieldMap) -> Result<PriceFacet, ScanError> {
        let original = map
            .original_price
            .as_deref()
            .and_then(|p| lookup(payload, p))
            .map(parse_price)
            .transpose()?;
        let discounted = map
            .discounted_price
            .as_deref()
            .and_then(|p| lookup(payload, p))
            .map(parse_price)
            .transpose()?;
        Ok(PriceFacet {
            original,
            discounted,
        })
    }
}

/// Parse a price value out of the payload.
///
/// Upstream sites deliver prices as numbers, numeric strings, or display
/// strings with thousands separators and a currency suffix ("12,900원").
pub fn parse_price(value: &Value) -> Result<i64, ScanError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .ok_or_else(|| ScanError::Extraction(format!("unparseable price: {n}"))),
        Value::String(s) => {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                return Err(ScanError::Extraction(format!("unparseable price: {s:?}")));
            }
            digits
                .parse::<i64>()
                .map_err(|e| ScanError::Extraction(format!("unparseable price {s:?}: {e}")))
        }
        other => Err(ScanError::Extraction(format!(
            "unexpected price shape: {other}"
        ))),
    }
}
