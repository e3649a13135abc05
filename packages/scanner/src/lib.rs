//! Platform abstraction layer for the product-data acquisition platform.
//!
//! Maps a platform tag to an extraction strategy (HTTP API, GraphQL, or
//! headless-browser DOM) and normalizes heterogeneous responses into a
//! common product record.
//!
//! # Architecture
//!
//! ```text
//! ScannerRegistry
//!     │
//!     └─► Scanner (per platform)
//!             ├─► PlatformProfile   (url parse, status vocab, NOT_FOUND)
//!             ├─► ScanStrategy      (http | graphql | browser)
//!             │       └─► navigation interpreter (browser only)
//!             └─► ExtractorFacade   (price ∥ status ∥ metadata)
//! ```
//!
//! Browser instances are owned by the caller (the server's pool); browser
//! strategies only borrow a page for the duration of one scan.

pub mod browser;
pub mod config;
pub mod error;
pub mod extract;
pub mod navigation;
pub mod platforms;
pub mod registry;
pub mod strategy;
pub mod testing;
pub mod types;
pub mod webdriver;

pub use browser::{BrowserHandle, BrowserLauncher, BrowserPage};
pub use config::{PlatformConfig, PlatformConfigs, StrategySpec};
pub use error::ScanError;
pub use registry::{ProductScanner, Scanner, ScannerRegistry, ScannerSet};
pub use types::{Platform, ProductRecord, SaleStatus, ScanMethod, ScanResult};
pub use webdriver::WebDriverLauncher;
