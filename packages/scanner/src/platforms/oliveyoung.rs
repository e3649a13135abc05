//! Olive Young: browser-scanned, goodsNo query parameter, deleted products
//! keep serving a placeholder page instead of a 404.

use serde_json::Value;

use super::{heuristic_status, NotFoundProbe, PlatformProfile};
use crate::types::{Platform, SaleStatus};

/// Placeholder title Olive Young renders for removed products.
const DELETED_PLACEHOLDER: &str = "삭제된 상품";

pub struct Oliveyoung;

impl PlatformProfile for Oliveyoung {
    fn platform(&self) -> Platform {
        Platform::Oliveyoung
    }

    fn extract_product_id(&self, url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        if !parsed
            .host_str()
            .is_some_and(|h| h.ends_with("oliveyoung.co.kr"))
        {
            return None;
        }
        parsed
            .query_pairs()
            .find(|(k, _)| k == "goodsNo")
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
    }

    fn normalize_status(&self, native: &str) -> SaleStatus {
        match native {
            "SALE" | "SELLING" => SaleStatus::OnSale,
            "SOLDOUT" | "TEMP_SOLDOUT" => SaleStatus::SoldOut,
            "STOP" | "END" => SaleStatus::OffSale,
            other => heuristic_status(other),
        }
    }

    fn is_not_found(&self, probe: &NotFoundProbe<'_>) -> bool {
        if probe.http_not_found {
            return true;
        }
        // The placeholder leaks through whichever field carried the name.
        match probe.payload {
            Value::String(s) => s.contains(DELETED_PLACEHOLDER),
            Value::Object(_) => probe
                .payload
                .to_string()
                .contains(DELETED_PLACEHOLDER),
            _ => false,
        }
    }
}
