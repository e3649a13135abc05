//! Workflow execution and job status endpoints.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use scanner::Platform;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::kernel::jobs::{Job, RepositoryError};
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub priority: i32,
    /// Must contain `platform`.
    pub params: Value,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

type ApiResult = (StatusCode, Json<Value>);

fn bad_request(message: impl Into<String>) -> ApiResult {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
}

fn repo_error(err: RepositoryError) -> ApiResult {
    let status = match err {
        RepositoryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

/// `POST /workflows/execute`: validate, build the job, enqueue it.
pub async fn execute_workflow_handler(
    Extension(state): Extension<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> ApiResult {
    if state.library.get(&request.workflow_id).is_none() {
        return bad_request(format!("unknown workflow {:?}", request.workflow_id));
    }

    let Some(platform_raw) = request.params.get("platform").and_then(Value::as_str) else {
        return bad_request("params.platform is required");
    };
    let platform: Platform = match platform_raw.parse() {
        Ok(platform) => platform,
        Err(e) => return bad_request(e.to_string()),
    };
    if state.platform_configs.get(platform).is_none() {
        return bad_request(format!("platform {platform} has no configuration loaded"));
    }

    let job = Job::builder()
        .workflow_id(request.workflow_id)
        .platform(platform)
        .priority(request.priority)
        .params(request.params)
        .metadata(request.metadata)
        .build();

    match state.repo.enqueue(&job).await {
        Ok(()) => {
            tracing::info!(job_id = %job.id, platform = %platform, "job accepted");
            (StatusCode::OK, Json(json!({ "job_id": job.id })))
        }
        Err(e) => repo_error(e),
    }
}

/// `GET /workflows/jobs/:job_id`: the full job status record.
pub async fn get_job_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult {
    match state.repo.load(job_id).await {
        Ok(Some(job)) => match serde_json::to_value(&job) {
            Ok(job) => (StatusCode::OK, Json(job)),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            ),
        },
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no job {job_id}") })),
        ),
        Err(e) => repo_error(e),
    }
}

/// `POST /workflows/jobs/:job_id/cancel`: flag the job for cooperative
/// cancellation; the engine checks the flag before each node.
pub async fn cancel_job_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult {
    match state.repo.request_cancel(job_id).await {
        Ok(true) => (StatusCode::OK, Json(json!({ "cancel_requested": true }))),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no job {job_id}") })),
        ),
        Err(e) => repo_error(e),
    }
}

/// `GET /workflows/platforms/:platform/recent`: observability read.
pub async fn recent_jobs_handler(
    Extension(state): Extension<AppState>,
    Path(platform): Path<String>,
) -> ApiResult {
    let platform: Platform = match platform.parse() {
        Ok(platform) => platform,
        Err(e) => return bad_request(e.to_string()),
    };
    match state.repo.list_recent(platform, 20).await {
        Ok(jobs) => match serde_json::to_value(&jobs) {
            Ok(jobs) => (StatusCode::OK, Json(json!({ "jobs": jobs }))),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            ),
        },
        Err(e) => repo_error(e),
    }
}
