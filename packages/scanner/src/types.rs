//! Core domain types shared by every scanner and by the workflow engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The six upstream e-commerce sites.
///
/// The platform tag is also the sharding key for queues and platform locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Oliveyoung,
    Hwahae,
    Musinsa,
    Ably,
    Kurly,
    Zigzag,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Oliveyoung,
        Platform::Hwahae,
        Platform::Musinsa,
        Platform::Ably,
        Platform::Kurly,
        Platform::Zigzag,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Oliveyoung => "oliveyoung",
            Platform::Hwahae => "hwahae",
            Platform::Musinsa => "musinsa",
            Platform::Ably => "ably",
            Platform::Kurly => "kurly",
            Platform::Zigzag => "zigzag",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oliveyoung" => Ok(Platform::Oliveyoung),
            "hwahae" => Ok(Platform::Hwahae),
            "musinsa" => Ok(Platform::Musinsa),
            "ably" => Ok(Platform::Ably),
            "kurly" => Ok(Platform::Kurly),
            "zigzag" => Ok(Platform::Zigzag),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown platform tag: {0}")]
pub struct UnknownPlatform(pub String);

/// Canonical sale-status vocabulary.
///
/// Every platform-native status maps into this set. "Temporarily out of
/// stock" and "sold out" both map to `SoldOut`; discontinued or
/// not-sellable states map to `OffSale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    OnSale,
    SoldOut,
    OffSale,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::OnSale => "on_sale",
            SaleStatus::SoldOut => "sold_out",
            SaleStatus::OffSale => "off_sale",
        }
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a platform is scanned at the top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMethod {
    Browser,
    Api,
}

/// A normalized product record, the common output of every strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discounted_price: Option<i64>,
    pub sale_status: SaleStatus,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// The outcome of scanning one product reference.
///
/// NOT_FOUND is a distinct success branch (`is_not_found = true`), not an
/// error: the product reference no longer resolves upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub platform: Platform,
    pub product_id: String,
    pub url: String,
    pub strategy: String,
    pub is_not_found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<ProductRecord>,
    pub scanned_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn found(
        platform: Platform,
        product_id: impl Into<String>,
        url: impl Into<String>,
        strategy: impl Into<String>,
        record: ProductRecord,
    ) -> Self {
        Self {
            platform,
            product_id: product_id.into(),
            url: url.into(),
            strategy: strategy.into(),
            is_not_found: false,
            record: Some(record),
            scanned_at: Utc::now(),
        }
    }

    pub fn not_found(
        platform: Platform,
        product_id: impl Into<String>,
        url: impl Into<String>,
        strategy: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            product_id: product_id.into(),
            url: url.into(),
            strategy: strategy.into(),
            is_not_found: true,
            record: None,
            scanned_at: Utc::now(),
        }
    }
}
