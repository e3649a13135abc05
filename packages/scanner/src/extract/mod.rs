//! Extraction phase: three specialized extractors behind one facade.
//!
//! Every strategy reduces its response to a JSON payload; the facade then
//! runs the price, sale-status and metadata extractors over that payload in
//! parallel and merges their facets into a draft record. Field lookup is
//! driven by the platform's field map (JSON pointers), or by the canonical
//! map when the strategy already resolved fields itself (HTML bodies).

mod metadata;
mod price;
mod status;

pub use metadata::{MetadataExtractor, MetadataFacet};
pub use price::{parse_price, PriceExtractor, PriceFacet};
pub use status::{StatusExtractor, StatusFacet};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::FieldMap;
use crate::error::ScanError;

/// One facet extractor. Implementations must be pure over the payload.
#[async_trait]
pub trait FacetExtractor: Send + Sync {
    type Facet;

    async fn extract(&self, payload: &Value, map: &FieldMap) -> Result<Self::Facet, ScanError>;
}

/// Field map for payloads already keyed canonically by the strategy.
pub fn canonical_field_map() -> FieldMap {
    FieldMap {
        name: "/name".to_string(),
        thumbnail_url: Some("/thumbnail_url".to_string()),
        original_price: Some("/original_price".to_string()),
        discounted_price: Some("/discounted_price".to_string()),
        sale_status: "/sale_status".to_string(),
        metadata: Default::default(),
    }
}

/// Resolve a field-map pointer against the payload.
pub(crate) fn lookup<'a>(payload: &'a Value, pointer: &str) -> Option<&'a Value> {
    match payload.pointer(pointer) {
        Some(Value::Null) | None => None,
        Some(v) => Some(v),
    }
}

/// The merged output of the three extractors, before platform-native
/// status normalization.
#[derive(Debug, Clone)]
pub struct DraftRecord {
    pub name: String,
    pub thumbnail_url: Option<String>,
    pub original_price: Option<i64>,
    pub discounted_price: Option<i64>,
    pub native_status: String,
    pub metadata: Map<String, Value>,
}

/// Facade over the three extractors.
#[derive(Default)]
pub struct ExtractorFacade {
    price: PriceExtractor,
    status: StatusExtractor,
    metadata: MetadataExtractor,
}

impl ExtractorFacade {
    pub async fn extract(
        &self,
        payload: &Value,
        map: &FieldMap,
    ) -> Result<DraftRecord, ScanError> {
        let (price, status, metadata) = tokio::join!(
            self.price.extract(payload, map),
            self.status.extract(payload, map),
            self.metadata.extract(payload, map),
        );
        let price = price?;
        let status = status?;
        let metadata = metadata?;

        let name = metadata
            .name
            .ok_or_else(|| ScanError::Extraction("missing product name".to_string()))?;

        Ok(DraftRecord {
            name,
            thumbnail_url: metadata.thumbnail_url,
            original_price: price.original,
            discounted_price: price.discounted,
            native_status: status.native,
            metadata: metadata.extra,
        })
    }
}
