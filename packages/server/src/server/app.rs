//! Application setup: axum router, shared state, middleware.

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use scanner::PlatformConfigs;

use crate::kernel::browser_pool::BrowserPool;
use crate::kernel::jobs::JobRepository;
use crate::kernel::workflow::WorkflowLibrary;
use crate::server::routes::{
    cancel_job_handler, execute_workflow_handler, get_job_handler, health_handler,
    recent_jobs_handler,
};

/// Shared state for the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn JobRepository>,
    pub library: Arc<WorkflowLibrary>,
    pub platform_configs: Arc<PlatformConfigs>,
    /// Absent in API-only deployments (no browser platforms served).
    pub pool: Option<Arc<BrowserPool>>,
    pub service_name: String,
}

/// Build the router with all routes and middleware.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/workflows/execute", post(execute_workflow_handler))
        .route("/workflows/jobs/:job_id", get(get_job_handler))
        .route("/workflows/jobs/:job_id/cancel", post(cancel_job_handler))
        .route(
            "/workflows/platforms/:platform/recent",
            get(recent_jobs_handler),
        )
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
