//! HTTP surface behavior: enqueue validation, job status reads, health.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use scanner::config::{FieldMap, PlatformConfig, StrategySpec};
use scanner::{Platform, PlatformConfigs};
use server_core::kernel::jobs::testing::InMemoryJobRepository;
use server_core::kernel::jobs::JobRepository;
use server_core::kernel::workflow::{NodeDefinition, WorkflowDefinition, WorkflowLibrary};
use server_core::server::{create_app, AppState};

fn ably_config() -> PlatformConfig {
    PlatformConfig {
        platform: Platform::Ably,
        display_name: "Ably".into(),
        base_url: "https://m.a-bly.com".into(),
        endpoints: Default::default(),
        strategies: vec![StrategySpec::Http {
            id: "detail-api".into(),
            priority: 1,
            url_template: "https://api.a-bly.com/goods/{product_id}".into(),
            headers: Default::default(),
            response: Default::default(),
            retry: Default::default(),
            timeout_ms: 1_000,
            delay_ms: 0,
        }],
        field_map: FieldMap {
            name: "/name".into(),
            thumbnail_url: None,
            original_price: None,
            discounted_price: None,
            sale_status: "/status".into(),
            metadata: Default::default(),
        },
        rate_limit: Default::default(),
        concurrency: Default::default(),
        rotate_after_scans: 10,
    }
}

fn validation_library() -> WorkflowLibrary {
    let definition = WorkflowDefinition {
        id: "ably-validation".to_string(),
        version: 1,
        start_node: "fetch".to_string(),
        nodes: [(
            "fetch".to_string(),
            NodeDefinition {
                node_type: "fetch".to_string(),
                name: "Fetch".to_string(),
                config: Map::new(),
                next_node: None,
                next_nodes: Vec::new(),
                retry: None,
                timeout_ms: None,
                stop_on_error: true,
            },
        )]
        .into_iter()
        .collect::<HashMap<_, _>>(),
    };
    WorkflowLibrary::new([definition]).unwrap()
}

async fn serve_app(repo: Arc<InMemoryJobRepository>) -> String {
    let state = AppState {
        repo,
        library: Arc::new(validation_library()),
        platform_configs: Arc::new(PlatformConfigs::new([ably_config()])),
        pool: None,
        service_name: "shelfscan-test".to_string(),
    };
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn execute_accepts_a_valid_request_and_enqueues() {
    let repo = Arc::new(InMemoryJobRepository::new());
    let base = serve_app(repo.clone()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/workflows/execute"))
        .json(&json!({
            "workflow_id": "ably-validation",
            "priority": 7,
            "params": {"platform": "ably", "limit": 3},
            "metadata": {"requested_by": "ops"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    let job_id = body["job_id"].as_str().unwrap().parse().unwrap();

    assert_eq!(repo.queue_len(Platform::Ably).await.unwrap(), 1);
    let job = repo.load(job_id).await.unwrap().unwrap();
    assert_eq!(job.priority, 7);
    assert_eq!(job.metadata["requested_by"], "ops");
}

#[tokio::test]
async fn execute_rejects_unknown_workflow_and_platform() {
    let base = serve_app(Arc::new(InMemoryJobRepository::new())).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/workflows/execute"))
        .json(&json!({
            "workflow_id": "nope",
            "params": {"platform": "ably"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .post(format!("{base}/workflows/execute"))
        .json(&json!({
            "workflow_id": "ably-validation",
            "params": {"platform": "amazon"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .post(format!("{base}/workflows/execute"))
        .json(&json!({
            "workflow_id": "ably-validation",
            "params": {"limit": 1}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400, "params.platform is required");
}

#[tokio::test]
async fn enqueue_surfaces_backing_store_outage_as_5xx() {
    let repo = Arc::new(InMemoryJobRepository::new());
    repo.set_unavailable(true);
    let base = serve_app(repo).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/workflows/execute"))
        .json(&json!({
            "workflow_id": "ably-validation",
            "params": {"platform": "ably"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn job_status_endpoint_round_trips_the_record() {
    let repo = Arc::new(InMemoryJobRepository::new());
    let base = serve_app(repo.clone()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/workflows/execute"))
        .json(&json!({
            "workflow_id": "ably-validation",
            "params": {"platform": "ably"}
        }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    let job_id = body["job_id"].as_str().unwrap();

    let response = client
        .get(format!("{base}/workflows/jobs/{job_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let job: Value = response.json().await.unwrap();
    assert_eq!(job["status"], "pending");
    assert_eq!(job["workflow_id"], "ably-validation");
    assert_eq!(job["platform"], "ably");

    let response = client
        .get(format!(
            "{base}/workflows/jobs/00000000-0000-0000-0000-000000000000"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn cancel_endpoint_flags_the_job() {
    let repo = Arc::new(InMemoryJobRepository::new());
    let base = serve_app(repo.clone()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/workflows/execute"))
        .json(&json!({
            "workflow_id": "ably-validation",
            "params": {"platform": "ably"}
        }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    let job_id: uuid::Uuid = body["job_id"].as_str().unwrap().parse().unwrap();

    let response = client
        .post(format!("{base}/workflows/jobs/{job_id}/cancel"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(repo.cancel_requested(job_id).await.unwrap());
}

#[tokio::test]
async fn health_reflects_loaded_configurations() {
    let base = serve_app(Arc::new(InMemoryJobRepository::new())).await;
    let response = reqwest::Client::new()
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["platforms_loaded"], 1);
    assert_eq!(body["workflows_loaded"], 1);
}
