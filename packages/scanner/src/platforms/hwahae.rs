//! Hwahae: API-scanned; 404s mark removed products.

use super::{heuristic_status, numeric_segment_after, NotFoundProbe, PlatformProfile};
use crate::types::{Platform, SaleStatus};

pub struct Hwahae;

impl PlatformProfile for Hwahae {
    fn platform(&self) -> Platform {
        Platform::Hwahae
    }

    fn extract_product_id(&self, url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        if !parsed.host_str().is_some_and(|h| h.ends_with("hwahae.co.kr")) {
            return None;
        }
        numeric_segment_after(url, "products").or_else(|| numeric_segment_after(url, "goods"))
    }

    fn normalize_status(&self, native: &str) -> SaleStatus {
        match native {
            "selling" | "on_sale" => SaleStatus::OnSale,
            "sold_out" | "temporarily_sold_out" => SaleStatus::SoldOut,
            "stopped" | "not_sellable" => SaleStatus::OffSale,
            other => heuristic_status(other),
        }
    }

    fn is_not_found(&self, probe: &NotFoundProbe<'_>) -> bool {
        probe.http_not_found
    }
}
