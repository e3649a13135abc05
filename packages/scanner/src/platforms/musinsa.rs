//! Musinsa: API-scanned; both the current `/products/` and the legacy
//! `/app/goods/` URL forms appear in reference data.

use super::{heuristic_status, numeric_segment_after, NotFoundProbe, PlatformProfile};
use crate::types::{Platform, SaleStatus};

pub struct Musinsa;

impl PlatformProfile for Musinsa {
    fn platform(&self) -> Platform {
        Platform::Musinsa
    }

    fn extract_product_id(&self, url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        if !parsed.host_str().is_some_and(|h| h.ends_with("musinsa.com")) {
            return None;
        }
        numeric_segment_after(url, "products").or_else(|| numeric_segment_after(url, "goods"))
    }

    fn normalize_status(&self, native: &str) -> SaleStatus {
        match native {
            "SALE" => SaleStatus::OnSale,
            "SOLDOUT" | "RESTOCK" => SaleStatus::SoldOut,
            "DISCONTINUED" | "SALESTOP" => SaleStatus::OffSale,
            other => heuristic_status(other),
        }
    }

    fn is_not_found(&self, probe: &NotFoundProbe<'_>) -> bool {
        probe.http_not_found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_current_and_legacy_urls() {
        assert_eq!(
            Musinsa
                .extract_product_id("https://www.musinsa.com/products/4912013")
                .as_deref(),
            Some("4912013")
        );
        assert_eq!(
            Musinsa
                .extract_product_id("https://www.musinsa.com/app/goods/2073557")
                .as_deref(),
            Some("2073557")
        );
    }

    #[test]
    fn restock_waits_count_as_sold_out() {
        assert_eq!(Musinsa.normalize_status("RESTOCK"), SaleStatus::SoldOut);
    }
}
