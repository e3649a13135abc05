//! Kurly: browser-scanned; removed products render an empty shell, so the
//! NOT_FOUND rule is an empty-extract sentinel.

use serde_json::Value;

use super::{heuristic_status, numeric_segment_after, NotFoundProbe, PlatformProfile};
use crate::types::{Platform, SaleStatus};

pub struct Kurly;

impl PlatformProfile for Kurly {
    fn platform(&self) -> Platform {
        Platform::Kurly
    }

    fn extract_product_id(&self, url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        if !parsed.host_str().is_some_and(|h| h.ends_with("kurly.com")) {
            return None;
        }
        numeric_segment_after(url, "goods")
    }

    fn normalize_status(&self, native: &str) -> SaleStatus {
        match native {
            "ON_SALE" => SaleStatus::OnSale,
            "SOLD_OUT" | "TEMPORARY_SOLD_OUT" => SaleStatus::SoldOut,
            "DISCONTINUED" => SaleStatus::OffSale,
            other => heuristic_status(other),
        }
    }

    fn is_not_found(&self, probe: &NotFoundProbe<'_>) -> bool {
        if probe.http_not_found {
            return true;
        }
        match probe.payload {
            Value::Null => true,
            Value::Object(map) => map.is_empty() || map.values().all(Value::is_null),
            _ => false,
        }
    }
}
