//! Zigzag: GraphQL-scanned catalog.

use super::{heuristic_status, numeric_segment_after, NotFoundProbe, PlatformProfile};
use crate::types::{Platform, SaleStatus};

pub struct Zigzag;

impl PlatformProfile for Zigzag {
    fn platform(&self) -> Platform {
        Platform::Zigzag
    }

    fn extract_product_id(&self, url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        if !parsed.host_str().is_some_and(|h| h.ends_with("zigzag.kr")) {
            return None;
        }
        numeric_segment_after(url, "products")
    }

    fn normalize_status(&self, native: &str) -> SaleStatus {
        match native {
            "SALE_AGENT" | "ON_SALE" => SaleStatus::OnSale,
            "SOLD_OUT" | "TEMPORARILY_SOLD_OUT" => SaleStatus::SoldOut,
            "SUSPENDED" | "CLOSED" => SaleStatus::OffSale,
            other => heuristic_status(other),
        }
    }

    fn is_not_found(&self, probe: &NotFoundProbe<'_>) -> bool {
        if probe.http_not_found {
            return true;
        }
        // The catalog API returns a null product node for removed ids.
        probe
            .payload
            .pointer("/catalog_product_detail")
            .is_some_and(|v| v.is_null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_product_url() {
        let id = Zigzag.extract_product_id("https://zigzag.kr/catalog/products/113322");
        assert_eq!(id.as_deref(), Some("113322"));
    }

    #[test]
    fn null_product_node_is_not_found() {
        let payload = serde_json::json!({"catalog_product_detail": null});
        let probe = NotFoundProbe {
            requested_url: "https://zigzag.kr/catalog/products/113322",
            final_url: None,
            payload: &payload,
            http_not_found: false,
        };
        assert!(Zigzag.is_not_found(&probe));
    }
}
