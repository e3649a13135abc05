//! Health check endpoint.

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    service: String,
    platforms_loaded: usize,
    workflows_loaded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    browser_pool: Option<BrowserPoolHealth>,
}

#[derive(Serialize)]
pub struct BrowserPoolHealth {
    size: usize,
    in_use: usize,
    available: usize,
}

/// Readiness is derived from whether platform configurations loaded.
///
/// Returns 200 when ready, 503 otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let ready = !state.platform_configs.is_empty();

    let browser_pool = state.pool.as_ref().map(|pool| {
        let status = pool.status();
        BrowserPoolHealth {
            size: status.size,
            in_use: status.in_use,
            available: status.available,
        }
    });

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if ready { "healthy" } else { "unhealthy" }.to_string(),
            service: state.service_name.clone(),
            platforms_loaded: state.platform_configs.len(),
            workflows_loaded: state.library.len(),
            browser_pool,
        }),
    )
}
