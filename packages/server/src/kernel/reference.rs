//! Reference data seam.
//!
//! The authoritative product database is an external collaborator; the
//! engine only needs "which products should this platform be scanned for,
//! and what do we believe about them". Deployments point the JSON-file
//! implementation at exported reference data; tests use the in-memory one.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use scanner::{Platform, SaleStatus};
use serde::{Deserialize, Serialize};

/// One authoritative database row, reduced to the compared field set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceProduct {
    pub product_id: String,
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub original_price: Option<i64>,
    #[serde(default)]
    pub discounted_price: Option<i64>,
    pub sale_status: SaleStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid reference data for {platform}: {message}")]
    Invalid { platform: Platform, message: String },
}

#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Targets to validate for a platform, in stored order, bounded by
    /// `limit` when given.
    async fn fetch_targets(
        &self,
        platform: Platform,
        limit: Option<usize>,
    ) -> Result<Vec<ReferenceProduct>, ReferenceError>;

    async fn get(
        &self,
        platform: Platform,
        product_id: &str,
    ) -> Result<Option<ReferenceProduct>, ReferenceError>;
}

/// Reference data loaded from `<dir>/<platform>.json` files.
pub struct JsonReferenceStore {
    products: HashMap<Platform, Vec<ReferenceProduct>>,
}

impl JsonReferenceStore {
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let mut products: HashMap<Platform, Vec<ReferenceProduct>> = HashMap::new();
        for platform in Platform::ALL {
            let path = dir.as_ref().join(format!("{platform}.json"));
            if !path.exists() {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            let rows: Vec<ReferenceProduct> =
                serde_json::from_str(&raw).map_err(|e| ReferenceError::Invalid {
                    platform,
                    message: e.to_string(),
                })?;
            products.insert(platform, rows);
        }
        tracing::info!(
            platforms = products.len(),
            "reference store loaded from files"
        );
        Ok(Self { products })
    }
}

#[async_trait]
impl ReferenceStore for JsonReferenceStore {
    async fn fetch_targets(
        &self,
        platform: Platform,
        limit: Option<usize>,
    ) -> Result<Vec<ReferenceProduct>, ReferenceError> {
        let rows = self.products.get(&platform).cloned().unwrap_or_default();
        Ok(match limit {
            Some(n) => rows.into_iter().take(n).collect(),
            None => rows,
        })
    }

    async fn get(
        &self,
        platform: Platform,
        product_id: &str,
    ) -> Result<Option<ReferenceProduct>, ReferenceError> {
        Ok(self
            .products
            .get(&platform)
            .and_then(|rows| rows.iter().find(|r| r.product_id == product_id))
            .cloned())
    }
}

/// Mutable in-memory store for tests.
#[derive(Default)]
pub struct InMemoryReferenceStore {
    products: Mutex<HashMap<Platform, Vec<ReferenceProduct>>>,
}

impl InMemoryReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, platform: Platform, product: ReferenceProduct) {
        self.products
            .lock()
            .unwrap()
            .entry(platform)
            .or_default()
            .push(product);
    }
}

#[async_trait]
impl ReferenceStore for InMemoryReferenceStore {
    async fn fetch_targets(
        &self,
        platform: Platform,
        limit: Option<usize>,
    ) -> Result<Vec<ReferenceProduct>, ReferenceError> {
        let rows = self
            .products
            .lock()
            .unwrap()
            .get(&platform)
            .cloned()
            .unwrap_or_default();
        Ok(match limit {
            Some(n) => rows.into_iter().take(n).collect(),
            None => rows,
        })
    }

    async fn get(
        &self,
        platform: Platform,
        product_id: &str,
    ) -> Result<Option<ReferenceProduct>, ReferenceError> {
        Ok(self
            .products
            .lock()
            .unwrap()
            .get(&platform)
            .and_then(|rows| rows.iter().find(|r| r.product_id == product_id).cloned()))
    }
}
