//! Ably: browser-scanned; removed products redirect away from the goods
//! path instead of serving an error page.

use super::{heuristic_status, numeric_segment_after, NotFoundProbe, PlatformProfile};
use crate::types::{Platform, SaleStatus};

pub struct Ably;

impl PlatformProfile for Ably {
    fn platform(&self) -> Platform {
        Platform::Ably
    }

    fn extract_product_id(&self, url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        if !parsed.host_str().is_some_and(|h| h.ends_with("a-bly.com")) {
            return None;
        }
        numeric_segment_after(url, "goods")
    }

    fn normalize_status(&self, native: &str) -> SaleStatus {
        match native {
            "selling" => SaleStatus::OnSale,
            "soldout" | "sold_out" => SaleStatus::SoldOut,
            "suspended" | "deleted" => SaleStatus::OffSale,
            other => heuristic_status(other),
        }
    }

    fn is_not_found(&self, probe: &NotFoundProbe<'_>) -> bool {
        if probe.http_not_found {
            return true;
        }
        // A product URL that settles anywhere but /goods/<id> was removed.
        match probe.final_url {
            Some(final_url) => !final_url.contains("/goods/"),
            None => false,
        }
    }
}
