//! Platform-specific knowledge: product-URL parsing, native status
//! vocabulary, and NOT_FOUND detection rules.
//!
//! Everything else in the crate is configuration-driven; these profiles
//! hold the parts that genuinely differ in kind between the six sites.

mod ably;
mod hwahae;
mod kurly;
mod musinsa;
mod oliveyoung;
mod zigzag;

pub use ably::Ably;
pub use hwahae::Hwahae;
pub use kurly::Kurly;
pub use musinsa::Musinsa;
pub use oliveyoung::Oliveyoung;
pub use zigzag::Zigzag;

use std::sync::Arc;

use serde_json::Value;

use crate::types::{Platform, SaleStatus};

/// Evidence available for NOT_FOUND detection after a strategy fetch.
pub struct NotFoundProbe<'a> {
    pub requested_url: &'a str,
    /// URL the fetch ended up on, when the transport exposes it.
    pub final_url: Option<&'a str>,
    pub payload: &'a Value,
    /// The transport observed an HTTP 404.
    pub http_not_found: bool,
}

pub trait PlatformProfile: Send + Sync {
    fn platform(&self) -> Platform;

    /// Parse the platform-native product id out of a product URL.
    fn extract_product_id(&self, url: &str) -> Option<String>;

    /// Map a platform-native status token into the canonical vocabulary.
    fn normalize_status(&self, native: &str) -> SaleStatus;

    /// Platform-specific NOT_FOUND rule. API-backed platforms get the 404
    /// check for free; override to add redirect or sentinel detection.
    fn is_not_found(&self, probe: &NotFoundProbe<'_>) -> bool {
        probe.http_not_found
    }
}

/// Profile lookup for a platform tag.
pub fn profile_for(platform: Platform) -> Arc<dyn PlatformProfile> {
    match platform {
        Platform::Oliveyoung => Arc::new(Oliveyoung),
        Platform::Hwahae => Arc::new(Hwahae),
        Platform::Musinsa => Arc::new(Musinsa),
        Platform::Ably => Arc::new(Ably),
        Platform::Kurly => Arc::new(Kurly),
        Platform::Zigzag => Arc::new(Zigzag),
    }
}

/// Shared fallback for status tokens no platform arm recognizes.
///
/// Temporarily-out-of-stock and sold-out variants both normalize to
/// `SoldOut`; discontinued/not-sellable variants to `OffSale`.
pub(crate) fn heuristic_status(native: &str) -> SaleStatus {
    let token = native.trim().to_ascii_lowercase();
    if token.contains("sold")
        || token.contains("out_of_stock")
        || token.contains("품절")
        || token.contains("일시품절")
        || token == "true"
    {
        SaleStatus::SoldOut
    } else if token.contains("stop")
        || token.contains("discontinued")
        || token.contains("closed")
        || token.contains("판매중지")
        || token.contains("판매종료")
    {
        SaleStatus::OffSale
    } else {
        SaleStatus::OnSale
    }
}

/// Extract the trailing numeric path segment after a marker segment, e.g.
/// `/goods/12345` with marker `goods` yields `12345`.
pub(crate) fn numeric_segment_after(url: &str, marker: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment == marker {
            let id = segments.next()?;
            if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
                return Some(id.to_string());
            }
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_maps_soldout_variants() {
        assert_eq!(heuristic_status("SOLDOUT"), SaleStatus::SoldOut);
        assert_eq!(heuristic_status("일시품절"), SaleStatus::SoldOut);
        assert_eq!(heuristic_status("true"), SaleStatus::SoldOut);
    }

    #[test]
    fn heuristic_maps_discontinued_to_off_sale() {
        assert_eq!(heuristic_status("판매중지"), SaleStatus::OffSale);
        assert_eq!(heuristic_status("DISCONTINUED"), SaleStatus::OffSale);
    }

    #[test]
    fn heuristic_defaults_to_on_sale() {
        assert_eq!(heuristic_status("SELLING"), SaleStatus::OnSale);
    }

    #[test]
    fn numeric_segment_parsing() {
        assert_eq!(
            numeric_segment_after("https://www.kurly.com/goods/5159902", "goods"),
            Some("5159902".to_string())
        );
        assert_eq!(
            numeric_segment_after("https://www.kurly.com/collections/all", "goods"),
            None
        );
        assert_eq!(
            numeric_segment_after("https://www.kurly.com/goods/not-a-number", "goods"),
            None
        );
    }
}
