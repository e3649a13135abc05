//! Name, thumbnail and free-form metadata extraction.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{lookup, FacetExtractor};
use crate::config::FieldMap;
use crate::error::ScanError;

#[derive(Debug, Clone, Default)]
pub struct MetadataFacet {
    pub name: Option<String>,
    pub thumbnail_url: Option<String>,
    pub extra: Map<String, Value>,
}

#[derive(Default)]
pub struct MetadataExtractor;

#[async_trait]
impl FacetExtractor for MetadataExtractor {
    type Facet = MetadataFacet;

    async fn extract(&self, payload: &Value, map: &FieldMap) -> Result<MetadataFacet, ScanError> {
        let name = lookup(payload, &map.name).map(as_text);
        let thumbnail_url = map
            .thumbnail_url
            .as_deref()
            .and_then(|p| lookup(payload, p))
            .map(as_text);

        let mut extra = Map::new();
        for (key, pointer) in &map.metadata {
            if let Some(value) = lookup(payload, pointer) {
                extra.insert(key.clone(), value.clone());
            }
        }

        Ok(MetadataFacet {
            name,
            thumbnail_url,
            extra,
        })
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}
