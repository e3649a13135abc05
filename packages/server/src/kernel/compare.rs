//! Field comparison between a scanned record and its authoritative row.
//!
//! Individual field comparators are interchangeable; the default set covers
//! the compared field set (name, thumbnail, both prices, sale status).

use scanner::ProductRecord;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::kernel::reference::ReferenceProduct;

/// One field's comparison verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldComparison {
    pub field: String,
    pub matched: bool,
    pub expected: Value,
    pub actual: Value,
}

/// A pluggable per-field comparator.
pub trait FieldComparator: Send + Sync {
    fn field(&self) -> &'static str;

    fn compare(&self, reference: &ReferenceProduct, scanned: &ProductRecord) -> FieldComparison;
}

/// Whole-record comparison outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonOutcome {
    pub product_id: String,
    pub matched: bool,
    pub fields: Vec<FieldComparison>,
}

/// The active comparator set.
pub struct ComparatorSet {
    comparators: Vec<Box<dyn FieldComparator>>,
}

impl ComparatorSet {
    pub fn new(comparators: Vec<Box<dyn FieldComparator>>) -> Self {
        Self { comparators }
    }

    pub fn compare(
        &self,
        reference: &ReferenceProduct,
        scanned: &ProductRecord,
    ) -> ComparisonOutcome {
        let fields: Vec<FieldComparison> = self
            .comparators
            .iter()
            .map(|c| c.compare(reference, scanned))
            .collect();
        ComparisonOutcome {
            product_id: reference.product_id.clone(),
            matched: fields.iter().all(|f| f.matched),
            fields,
        }
    }
}

impl Default for ComparatorSet {
    fn default() -> Self {
        Self::new(vec![
            Box::new(NameComparator),
            Box::new(ThumbnailComparator),
            Box::new(OriginalPriceComparator),
            Box::new(DiscountedPriceComparator),
            Box::new(SaleStatusComparator),
        ])
    }
}

// ============================================================================
// Default comparators
// ============================================================================

struct NameComparator;

impl FieldComparator for NameComparator {
    fn field(&self) -> &'static str {
        "name"
    }

    fn compare(&self, reference: &ReferenceProduct, scanned: &ProductRecord) -> FieldComparison {
        // Whitespace runs differ between the DB and rendered pages.
        let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        FieldComparison {
            field: self.field().to_string(),
            matched: normalize(&reference.name) == normalize(&scanned.name),
            expected: json!(reference.name),
            actual: json!(scanned.name),
        }
    }
}

struct ThumbnailComparator;

impl FieldComparator for ThumbnailComparator {
    fn field(&self) -> &'static str {
        "thumbnail_url"
    }

    fn compare(&self, reference: &ReferenceProduct, scanned: &ProductRecord) -> FieldComparison {
        // CDN query strings (sizing, cache busting) are not differences.
        let strip_query = |s: &str| s.split('?').next().unwrap_or(s).to_string();
        let expected = reference.thumbnail_url.as_deref().map(strip_query);
        let actual = scanned.thumbnail_url.as_deref().map(strip_query);
        FieldComparison {
            field: self.field().to_string(),
            matched: expected == actual,
            expected: json!(reference.thumbnail_url),
            actual: json!(scanned.thumbnail_url),
        }
    }
}

struct OriginalPriceComparator;

impl FieldComparator for OriginalPriceComparator {
    fn field(&self) -> &'static str {
        "original_price"
    }

    fn compare(&self, reference: &ReferenceProduct, scanned: &ProductRecord) -> FieldComparison {
        FieldComparison {
            field: self.field().to_string(),
            matched: reference.original_price == scanned.original_price,
            expected: json!(reference.original_price),
            actual: json!(scanned.original_price),
        }
    }
}

struct DiscountedPriceComparator;

impl FieldComparator for DiscountedPriceComparator {
    fn field(&self) -> &'static str {
        "discounted_price"
    }

    fn compare(&self, reference: &ReferenceProduct, scanned: &ProductRecord) -> FieldComparison {
        FieldComparison {
            field: self.field().to_string(),
            matched: reference.discounted_price == scanned.discounted_price,
            expected: json!(reference.discounted_price),
            actual: json!(scanned.discounted_price),
        }
    }
}

struct SaleStatusComparator;

impl FieldComparator for SaleStatusComparator {
    fn field(&self) -> &'static str {
        "sale_status"
    }

    fn compare(&self, reference: &ReferenceProduct, scanned: &ProductRecord) -> FieldComparison {
        FieldComparison {
            field: self.field().to_string(),
            matched: reference.sale_status == scanned.sale_status,
            expected: json!(reference.sale_status),
            actual: json!(scanned.sale_status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner::SaleStatus;

    fn reference() -> ReferenceProduct {
        ReferenceProduct {
            product_id: "A1".to_string(),
            url: "https://shop.example/goods/A1".to_string(),
            name: "Vitamin C Serum".to_string(),
            thumbnail_url: Some("https://img.example/a1.jpg".to_string()),
            original_price: Some(30_000),
            discounted_price: Some(24_000),
            sale_status: SaleStatus::OnSale,
        }
    }

    fn scanned() -> ProductRecord {
        ProductRecord {
            name: "Vitamin C  Serum".to_string(),
            thumbnail_url: Some("https://img.example/a1.jpg?w=600".to_string()),
            original_price: Some(30_000),
            discounted_price: Some(24_000),
            sale_status: SaleStatus::OnSale,
            metadata: Default::default(),
        }
    }

    #[test]
    fn matching_record_matches_on_every_field() {
        let outcome = ComparatorSet::default().compare(&reference(), &scanned());
        assert!(outcome.matched, "{:?}", outcome.fields);
        assert_eq!(outcome.fields.len(), 5);
    }

    #[test]
    fn whitespace_and_cdn_queries_are_normalized() {
        let outcome = ComparatorSet::default().compare(&reference(), &scanned());
        let by_field = |name: &str| {
            outcome
                .fields
                .iter()
                .find(|f| f.field == name)
                .unwrap()
                .matched
        };
        assert!(by_field("name"));
        assert!(by_field("thumbnail_url"));
    }

    #[test]
    fn price_drift_is_a_mismatch() {
        let mut record = scanned();
        record.discounted_price = Some(19_900);
        let outcome = ComparatorSet::default().compare(&reference(), &record);
        assert!(!outcome.matched);
        let price = outcome
            .fields
            .iter()
            .find(|f| f.field == "discounted_price")
            .unwrap();
        assert!(!price.matched);
        assert_eq!(price.actual, json!(19_900));
    }

    #[test]
    fn status_drift_is_a_mismatch() {
        let mut record = scanned();
        record.sale_status = SaleStatus::SoldOut;
        assert!(!ComparatorSet::default().compare(&reference(), &record).matched);
    }
}
