//! Scanner registry: platform tag → scanner.
//!
//! A scanner is the composition of a platform profile (URL parsing, status
//! vocabulary, NOT_FOUND rule), the configured strategies, and the
//! extraction facade. The registry compiles everything once from the loaded
//! platform configurations; from then on dispatch is table-driven.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::browser::BrowserPage;
use crate::config::{PlatformConfig, PlatformConfigs};
use crate::error::ScanError;
use crate::extract::{canonical_field_map, ExtractorFacade};
use crate::platforms::{profile_for, NotFoundProbe, PlatformProfile};
use crate::strategy::{build_strategy, ScanStrategy};
use crate::types::{Platform, ProductRecord, ScanMethod, ScanResult};

/// The seam the workflow engine scans through. Implemented by [`Scanner`]
/// and by test doubles.
#[async_trait]
pub trait ProductScanner: Send + Sync {
    fn platform(&self) -> Platform;

    fn scan_method(&self) -> ScanMethod;

    /// Platform-specific URL parse producing the native id, or None.
    fn extract_product_id(&self, url: &str) -> Option<String>;

    /// Scan one product reference into a normalized result.
    async fn scan(
        &self,
        url: &str,
        page: Option<&mut (dyn BrowserPage + '_)>,
        cancel: &CancellationToken,
    ) -> Result<ScanResult, ScanError>;
}

/// Lookup seam over the full scanner table.
pub trait ScannerSet: Send + Sync {
    fn get(&self, platform: Platform) -> Option<Arc<dyn ProductScanner>>;
}

/// One platform's compiled scanner.
pub struct Scanner {
    profile: Arc<dyn PlatformProfile>,
    config: Arc<PlatformConfig>,
    strategies: Vec<Arc<dyn ScanStrategy>>,
    facade: ExtractorFacade,
}

impl Scanner {
    pub fn build(
        config: Arc<PlatformConfig>,
        client: reqwest::Client,
    ) -> Result<Self, ScanError> {
        if config.strategies.is_empty() {
            return Err(ScanError::Config(format!(
                "platform {} has no strategies",
                config.platform
            )));
        }
        let field_map = Arc::new(config.field_map.clone());
        let strategies = config
            .strategies
            .iter()
            .map(|spec| build_strategy(spec, field_map.clone(), client.clone()))
            .collect();
        Ok(Self {
            profile: profile_for(config.platform),
            config,
            strategies,
            facade: ExtractorFacade::default(),
        })
    }

    /// Pick the strategy with the lowest priority number, or the one the
    /// caller names.
    fn pick_strategy(&self, strategy_id: Option<&str>) -> Result<&Arc<dyn ScanStrategy>, ScanError> {
        match strategy_id {
            Some(id) => self
                .strategies
                .iter()
                .find(|s| s.id() == id)
                .ok_or_else(|| {
                    ScanError::Config(format!(
                        "platform {} has no strategy {id:?}",
                        self.config.platform
                    ))
                }),
            None => self
                .strategies
                .iter()
                .min_by_key(|s| s.priority())
                .ok_or_else(|| ScanError::Config("no strategies".to_string())),
        }
    }

    /// Scan with an explicit strategy id.
    pub async fn scan_with_strategy(
        &self,
        url: &str,
        strategy_id: Option<&str>,
        page: Option<&mut (dyn BrowserPage + '_)>,
        cancel: &CancellationToken,
    ) -> Result<ScanResult, ScanError> {
        let product_id = self.extract_product_id(url).ok_or_else(|| {
            ScanError::Extraction(format!(
                "unrecognized {} product url: {url}",
                self.config.platform
            ))
        })?;

        let strategy = self.pick_strategy(strategy_id)?;
        let payload = strategy.fetch(&product_id, page, cancel).await?;

        let probe = NotFoundProbe {
            requested_url: url,
            final_url: payload.final_url.as_deref(),
            payload: &payload.value,
            http_not_found: payload.http_not_found,
        };
        if self.profile.is_not_found(&probe) {
            tracing::debug!(
                platform = %self.config.platform,
                product_id = %product_id,
                "product no longer resolves"
            );
            return Ok(ScanResult::not_found(
                self.config.platform,
                product_id,
                url,
                strategy.id(),
            ));
        }

        let map = if payload.canonical {
            canonical_field_map()
        } else {
            self.config.field_map.clone()
        };
        let draft = self.facade.extract(&payload.value, &map).await?;

        let record = ProductRecord {
            name: draft.name,
            thumbnail_url: draft.thumbnail_url,
            original_price: draft.original_price,
            discounted_price: draft.discounted_price,
            sale_status: self.profile.normalize_status(&draft.native_status),
            metadata: draft.metadata,
        };

        Ok(ScanResult::found(
            self.config.platform,
            product_id,
            url,
            strategy.id(),
            record,
        ))
    }
}

#[async_trait]
impl ProductScanner for Scanner {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    fn scan_method(&self) -> ScanMethod {
        self.config.scan_method()
    }

    fn extract_product_id(&self, url: &str) -> Option<String> {
        self.profile.extract_product_id(url)
    }

    async fn scan(
        &self,
        url: &str,
        page: Option<&mut (dyn BrowserPage + '_)>,
        cancel: &CancellationToken,
    ) -> Result<ScanResult, ScanError> {
        self.scan_with_strategy(url, None, page, cancel).await
    }
}

/// The full platform → scanner table.
pub struct ScannerRegistry {
    scanners: HashMap<Platform, Arc<Scanner>>,
}

impl ScannerRegistry {
    pub fn build(configs: &PlatformConfigs) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("shelfscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScanError::Config(format!("http client: {e}")))?;

        let mut scanners = HashMap::new();
        for platform in configs.platforms() {
            let config = configs
                .get(platform)
                .ok_or_else(|| ScanError::Config(format!("missing config for {platform}")))?;
            scanners.insert(platform, Arc::new(Scanner::build(config, client.clone())?));
        }
        tracing::info!(platforms = scanners.len(), "scanner registry built");
        Ok(Self { scanners })
    }

    pub fn scanner(&self, platform: Platform) -> Option<Arc<Scanner>> {
        self.scanners.get(&platform).cloned()
    }

    pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.scanners.keys().copied()
    }
}

impl ScannerSet for ScannerRegistry {
    fn get(&self, platform: Platform) -> Option<Arc<dyn ProductScanner>> {
        self.scanners
            .get(&platform)
            .cloned()
            .map(|s| s as Arc<dyn ProductScanner>)
    }
}
