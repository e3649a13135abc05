//! Shared harness for engine and worker integration tests: in-memory
//! stores, a fake browser pool, and a scriptable scanner set.
#![allow(dead_code)] // not every test binary uses every helper

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scanner::browser::BrowserPage;
use scanner::testing::{FakeLauncher, FakePage};
use scanner::{
    Platform, PlatformConfigs, ProductRecord, ProductScanner, SaleStatus, ScanError, ScanMethod,
    ScanResult, ScannerSet,
};
use tokio_util::sync::CancellationToken;

use server_core::kernel::browser_pool::BrowserPool;
use server_core::kernel::compare::ComparatorSet;
use server_core::kernel::jobs::testing::{
    InMemoryJobRepository, InMemoryPlatformLock, InMemorySchedulerStore,
};
use server_core::kernel::notify::RecordingNotifier;
use server_core::kernel::reference::{InMemoryReferenceStore, ReferenceProduct};
use server_core::kernel::workflow::{
    default_factory, NodeDeps, NodeFactory, WorkflowEngine, WorkflowLibrary,
};

/// What the mock scanner should do for one URL.
#[derive(Debug, Clone)]
pub enum ScanScript {
    Success(ProductRecord),
    NotFound,
    FailTransient,
    /// Crash the browser on the first attempt, succeed on the retry.
    CrashOnce(ProductRecord),
}

/// One observed scan, for ordering assertions.
#[derive(Debug, Clone)]
pub struct ScanEvent {
    pub platform: Platform,
    pub url: String,
    pub started: tokio::time::Instant,
    pub ended: tokio::time::Instant,
}

#[derive(Default)]
struct ScriptQueue {
    steps: Vec<ScanScript>,
    cursor: usize,
}

impl ScriptQueue {
    /// Next scripted outcome; the last one repeats once the queue drains.
    fn next(&mut self) -> Option<ScanScript> {
        if self.steps.is_empty() {
            return None;
        }
        let index = self.cursor.min(self.steps.len() - 1);
        self.cursor += 1;
        Some(self.steps[index].clone())
    }
}

/// Scriptable [`ProductScanner`] double. Each `script` call appends one
/// outcome for the URL; successive scans consume them in order.
pub struct MockScanner {
    platform: Platform,
    method: ScanMethod,
    scripts: Mutex<HashMap<String, ScriptQueue>>,
    crashed: Mutex<HashMap<String, bool>>,
    pub events: Arc<Mutex<Vec<ScanEvent>>>,
    pub scan_duration: Duration,
}

impl MockScanner {
    pub fn new(platform: Platform, method: ScanMethod) -> Self {
        Self {
            platform,
            method,
            scripts: Mutex::new(HashMap::new()),
            crashed: Mutex::new(HashMap::new()),
            events: Arc::new(Mutex::new(Vec::new())),
            scan_duration: Duration::ZERO,
        }
    }

    pub fn with_scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    pub fn script(&self, url: &str, script: ScanScript) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .steps
            .push(script);
    }
}

pub fn record(name: &str) -> ProductRecord {
    ProductRecord {
        name: name.to_string(),
        thumbnail_url: None,
        original_price: Some(10_000),
        discounted_price: Some(8_000),
        sale_status: SaleStatus::OnSale,
        metadata: Default::default(),
    }
}

pub fn reference_row(platform: Platform, id: &str, name: &str) -> ReferenceProduct {
    ReferenceProduct {
        product_id: id.to_string(),
        url: format!("https://shop.example/{platform}/{id}"),
        name: name.to_string(),
        thumbnail_url: None,
        original_price: Some(10_000),
        discounted_price: Some(8_000),
        sale_status: SaleStatus::OnSale,
    }
}

#[async_trait]
impl ProductScanner for MockScanner {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn scan_method(&self) -> ScanMethod {
        self.method
    }

    fn extract_product_id(&self, url: &str) -> Option<String> {
        url.rsplit('/').next().map(str::to_string)
    }

    async fn scan(
        &self,
        url: &str,
        page: Option<&mut (dyn BrowserPage + '_)>,
        _cancel: &CancellationToken,
    ) -> Result<ScanResult, ScanError> {
        if self.method == ScanMethod::Browser && page.is_none() {
            return Err(ScanError::MissingBrowser);
        }

        let started = tokio::time::Instant::now();
        if !self.scan_duration.is_zero() {
            tokio::time::sleep(self.scan_duration).await;
        }

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(ScriptQueue::next);
        let id = self.extract_product_id(url).unwrap_or_default();
        let outcome = match script {
            Some(ScanScript::Success(record)) => {
                Ok(ScanResult::found(self.platform, id, url, "mock", record))
            }
            Some(ScanScript::NotFound) => {
                Ok(ScanResult::not_found(self.platform, id, url, "mock"))
            }
            Some(ScanScript::FailTransient) => Err(ScanError::TransientUpstream {
                status: Some(503),
                message: "scripted upstream failure".to_string(),
            }),
            Some(ScanScript::CrashOnce(record)) => {
                let mut crashed = self.crashed.lock().unwrap();
                if crashed.insert(url.to_string(), true).is_none() {
                    Err(ScanError::BrowserCrashed("scripted crash".to_string()))
                } else {
                    Ok(ScanResult::found(self.platform, id, url, "mock", record))
                }
            }
            None => Ok(ScanResult::not_found(self.platform, id, url, "mock")),
        };

        self.events.lock().unwrap().push(ScanEvent {
            platform: self.platform,
            url: url.to_string(),
            started,
            ended: tokio::time::Instant::now(),
        });
        outcome
    }
}

/// Static platform → scanner table for tests.
#[derive(Default)]
pub struct StaticScannerSet {
    scanners: HashMap<Platform, Arc<dyn ProductScanner>>,
}

impl StaticScannerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scanner: Arc<dyn ProductScanner>) {
        self.scanners.insert(scanner.platform(), scanner);
    }
}

impl ScannerSet for StaticScannerSet {
    fn get(&self, platform: Platform) -> Option<Arc<dyn ProductScanner>> {
        self.scanners.get(&platform).cloned()
    }
}

/// Everything an engine/worker test needs, wired with in-memory parts.
pub struct Harness {
    pub repo: Arc<InMemoryJobRepository>,
    pub lock: Arc<InMemoryPlatformLock>,
    pub scheduler: Arc<InMemorySchedulerStore>,
    pub reference: Arc<InMemoryReferenceStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub pool: Arc<BrowserPool>,
    pub launcher: Arc<FakeLauncher>,
    pub engine: Arc<WorkflowEngine>,
    pub results_dir: tempfile::TempDir,
}

impl Harness {
    /// Build a harness around a workflow library and a scanner set.
    /// `customize` may register extra node types on the factory.
    pub async fn build(
        library: WorkflowLibrary,
        scanners: StaticScannerSet,
        pool_size: usize,
        customize: impl FnOnce(&mut NodeFactory),
    ) -> Self {
        let repo = Arc::new(InMemoryJobRepository::new());
        let lock = Arc::new(InMemoryPlatformLock::new());
        let scheduler = Arc::new(InMemorySchedulerStore::new());
        let reference = Arc::new(InMemoryReferenceStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let launcher = Arc::new(FakeLauncher::new(FakePage::default()));
        let pool = Arc::new(
            BrowserPool::initialize(launcher.clone(), pool_size)
                .await
                .expect("fake pool"),
        );

        let deps = Arc::new(NodeDeps {
            scanners: Arc::new(scanners),
            pool: pool.clone(),
            reference: reference.clone(),
            notifier: notifier.clone(),
            comparators: Arc::new(ComparatorSet::default()),
        });
        let mut factory = default_factory(deps);
        customize(&mut factory);

        let engine = Arc::new(WorkflowEngine::new(
            Arc::new(factory),
            repo.clone(),
            Arc::new(library),
            Arc::new(PlatformConfigs::default()),
        ));

        Self {
            repo,
            lock,
            scheduler,
            reference,
            notifier,
            pool,
            launcher,
            engine,
            results_dir: tempfile::tempdir().expect("tempdir"),
        }
    }
}
