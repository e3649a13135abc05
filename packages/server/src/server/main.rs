//! Service entrypoint: loads configuration, wires the kernel, spawns the
//! per-platform workers and the cron scheduler, and serves the HTTP API.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use scanner::{
    Platform, PlatformConfigs, ScannerRegistry, WebDriverLauncher,
};
use server_core::common::env::EnvConfig;
use server_core::kernel::browser_pool::BrowserPool;
use server_core::kernel::compare::ComparatorSet;
use server_core::kernel::jobs::{
    JobRepository, PlatformLock, RedisJobRepository, RedisPlatformLock, RedisSchedulerStore,
    SchedulerStore,
};
use server_core::kernel::notify::{NoopNotifier, Notifier, WebhookNotifier};
use server_core::kernel::reference::{JsonReferenceStore, ReferenceStore};
use server_core::kernel::scheduled_tasks::start_scheduler;
use server_core::kernel::worker::{spawn_platform_workers, WorkerConfig};
use server_core::kernel::workflow::{default_factory, NodeDeps, WorkflowEngine, WorkflowLibrary};
use server_core::server::{create_app, AppState};

#[derive(Parser, Debug)]
#[command(name = "server", about = "Product-data acquisition service")]
struct Args {
    /// Comma-separated platform set for this worker (overrides
    /// WORKER_PLATFORMS).
    #[arg(long)]
    platforms: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut env = EnvConfig::from_env()?;
    init_tracing(&env)?;
    if let Some(raw) = args.platforms {
        env.worker_platforms = Some(server_core::common::env::parse_platform_list(&raw)?);
    }
    tracing::info!(service = %env.service_name, "starting");

    // Static configuration.
    let platform_configs = Arc::new(
        PlatformConfigs::load_dir(&env.platform_config_dir)
            .with_context(|| format!("loading platform configs from {}", env.platform_config_dir))?,
    );
    let library = Arc::new(
        WorkflowLibrary::load_dir(&env.workflow_config_dir)
            .with_context(|| format!("loading workflows from {}", env.workflow_config_dir))?,
    );
    let registry = Arc::new(ScannerRegistry::build(&platform_configs)?);
    let reference: Arc<dyn ReferenceStore> = Arc::new(
        JsonReferenceStore::load_dir(&env.reference_dir)
            .with_context(|| format!("loading reference data from {}", env.reference_dir))?,
    );
    let notifier: Arc<dyn Notifier> = match &env.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url)),
        None => Arc::new(NoopNotifier),
    };

    // Backing store.
    let client = redis::Client::open(env.redis_url.as_str())
        .with_context(|| format!("invalid REDIS_URL {}", env.redis_url))?;
    let con = client
        .get_connection_manager()
        .await
        .context("connecting to the backing store")?;
    let repo: Arc<dyn JobRepository> = Arc::new(RedisJobRepository::new(con.clone()));
    let lock: Arc<dyn PlatformLock> = Arc::new(RedisPlatformLock::new(con.clone()));
    let scheduler_store: Arc<dyn SchedulerStore> = Arc::new(RedisSchedulerStore::new(con));

    // Browser pool.
    let launcher = Arc::new(WebDriverLauncher::new(&env.webdriver_url));
    let pool = Arc::new(
        BrowserPool::initialize(launcher, env.browser_pool_size)
            .await
            .context("initializing the browser pool")?,
    );

    // Engine.
    let deps = Arc::new(NodeDeps {
        scanners: registry.clone(),
        pool: pool.clone(),
        reference,
        notifier,
        comparators: Arc::new(ComparatorSet::default()),
    });
    let factory = Arc::new(default_factory(deps));
    let engine = Arc::new(WorkflowEngine::new(
        factory,
        repo.clone(),
        library.clone(),
        platform_configs.clone(),
    ));

    // Workers: one loop per platform in the configured set.
    let platforms: Vec<Platform> = env
        .worker_platforms
        .clone()
        .unwrap_or_else(|| platform_configs.platforms().collect());
    let shutdown = CancellationToken::new();
    let worker_config = WorkerConfig {
        worker_id: format!("{}-{}", env.service_name, Uuid::new_v4()),
        poll_interval: env.poll_interval,
        lock_ttl: env.lock_ttl,
        results_dir: env.results_dir.clone().into(),
    };
    let workers = spawn_platform_workers(
        &platforms,
        repo.clone(),
        lock.clone(),
        scheduler_store.clone(),
        engine.clone(),
        worker_config,
        shutdown.clone(),
    );
    tracing::info!(platforms = ?platforms, "workers spawned");

    let mut cron = start_scheduler(
        repo.clone(),
        scheduler_store.clone(),
        library.clone(),
        platforms.clone(),
    )
    .await?;

    // HTTP surface.
    let state = AppState {
        repo: repo.clone(),
        library: library.clone(),
        platform_configs: platform_configs.clone(),
        pool: Some(pool.clone()),
        service_name: env.service_name.clone(),
    };
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(&env.bind_addr)
        .await
        .with_context(|| format!("binding {}", env.bind_addr))?;
    tracing::info!(addr = %env.bind_addr, "http server listening");

    let signal_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            signal_shutdown.cancel();
        })
        .await?;

    // Explicit shutdown: drain workers, stop cron, close browsers.
    shutdown.cancel();
    for handle in workers {
        let _ = handle.await;
    }
    if let Err(e) = cron.shutdown().await {
        tracing::warn!(error = %e, "cron shutdown failed");
    }
    pool.cleanup().await;

    tracing::info!("bye");
    Ok(())
}

/// Route logs to `<LOG_DIR>/<SERVICE_NAME>.log` when a log directory is
/// configured, stderr otherwise. Rotation is left to the host.
fn init_tracing(env: &EnvConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &env.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = std::path::Path::new(dir).join(format!("{}.log", env.service_name));
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}
