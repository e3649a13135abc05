//! Worker-loop behavior end to end: full validation runs, priority
//! ordering, lock loss, pool contention across platforms, and backing
//! store outages.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use common::{record, reference_row, Harness, MockScanner, ScanScript, StaticScannerSet};
use scanner::{Platform, ScanMethod};
use server_core::kernel::jobs::{Job, JobRepository, JobStatus, PlatformLock, SchedulerStore};
use server_core::kernel::results::classify;
use server_core::kernel::worker::{PlatformWorker, WorkerConfig};
use server_core::kernel::workflow::{NodeDefinition, WorkflowDefinition, WorkflowLibrary};

fn node(node_type: &str, next: Option<&str>) -> NodeDefinition {
    NodeDefinition {
        node_type: node_type.to_string(),
        name: node_type.to_string(),
        config: Map::new(),
        next_node: next.map(String::from),
        next_nodes: Vec::new(),
        retry: None,
        timeout_ms: None,
        stop_on_error: true,
    }
}

fn validation_workflow(id: &str) -> WorkflowDefinition {
    WorkflowDefinition {
        id: id.to_string(),
        version: 1,
        start_node: "fetch".to_string(),
        nodes: [
            ("fetch", node("fetch", Some("scan"))),
            ("scan", node("scan", Some("validate"))),
            ("validate", node("validate", Some("compare"))),
            ("compare", node("compare", Some("save"))),
            ("save", node("save", Some("notify"))),
            ("notify", node("notify", None)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect::<HashMap<_, _>>(),
    }
}

fn fetch_only_workflow(id: &str) -> WorkflowDefinition {
    WorkflowDefinition {
        id: id.to_string(),
        version: 1,
        start_node: "fetch".to_string(),
        nodes: [("fetch".to_string(), node("fetch", None))]
            .into_iter()
            .collect(),
    }
}

fn worker_config(harness: &Harness) -> WorkerConfig {
    WorkerConfig {
        worker_id: format!("test-worker-{}", Uuid::new_v4()),
        poll_interval: Duration::from_millis(20),
        lock_ttl: Duration::from_secs(60),
        results_dir: harness.results_dir.path().to_path_buf(),
    }
}

fn spawn_worker(
    harness: &Harness,
    platform: Platform,
    config: WorkerConfig,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let worker = PlatformWorker::new(
        platform,
        harness.repo.clone(),
        harness.lock.clone(),
        harness.scheduler.clone(),
        harness.engine.clone(),
        config,
    );
    tokio::spawn(async move { worker.run(shutdown).await })
}

async fn wait_terminal(harness: &Harness, id: Uuid, budget: Duration) -> Job {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        if let Some(job) = harness.repo.load(id).await.unwrap() {
            if job.status.is_terminal() {
                return job;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} did not reach a terminal state in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn result_file(harness: &Harness, platform: Platform, id: Uuid) -> std::path::PathBuf {
    let date_dirs: Vec<_> = std::fs::read_dir(harness.results_dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    for dir in date_dirs {
        let candidate = dir.join(format!("job_{platform}_{id}.jsonl"));
        if candidate.exists() {
            return candidate;
        }
    }
    panic!("no result file for job {id}");
}

#[tokio::test]
async fn validation_run_produces_header_records_and_footer() {
    let scanner = MockScanner::new(Platform::Ably, ScanMethod::Api);
    scanner.script("https://shop.example/ably/1", ScanScript::Success(record("ably one")));
    scanner.script("https://shop.example/ably/2", ScanScript::NotFound);
    scanner.script("https://shop.example/ably/3", ScanScript::FailTransient);
    let mut scanners = StaticScannerSet::new();
    scanners.insert(Arc::new(scanner));

    let harness = Harness::build(
        WorkflowLibrary::new([validation_workflow("ably-validation")]).unwrap(),
        scanners,
        1,
        |_| {},
    )
    .await;
    harness
        .reference
        .insert(Platform::Ably, reference_row(Platform::Ably, "1", "ably one"));
    harness
        .reference
        .insert(Platform::Ably, reference_row(Platform::Ably, "2", "ably two"));
    harness
        .reference
        .insert(Platform::Ably, reference_row(Platform::Ably, "3", "ably three"));

    let job = Job::new(
        "ably-validation",
        Platform::Ably,
        0,
        json!({ "platform": "ably", "limit": 3 }),
    );
    harness.repo.enqueue(&job).await.unwrap();

    let shutdown = CancellationToken::new();
    let handle = spawn_worker(&harness, Platform::Ably, worker_config(&harness), shutdown.clone());

    let finished = wait_terminal(&harness, job.id, Duration::from_secs(5)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(finished.status, JobStatus::Completed);

    let report = classify(result_file(&harness, Platform::Ably, job.id))
        .await
        .unwrap();
    assert!(report.is_complete(), "footer must be present");
    assert_eq!(report.records.len(), 3);
    let counters = report.recount();
    assert_eq!(counters.total, 3);
    assert_eq!(
        (counters.success, counters.not_found, counters.failed),
        (1, 1, 1)
    );
    let footer = report.footer.unwrap();
    assert_eq!(footer["summary"]["total"], 3);

    // The matched scan row compared clean against its reference.
    let success_row = report
        .records
        .iter()
        .find(|r| r["status"] == "success")
        .unwrap();
    assert_eq!(success_row["matched"], true);

    // Cleanup path ran: completion recorded, mirror cleared, lock free.
    assert!(harness
        .scheduler
        .platform_schedule(Platform::Ably)
        .await
        .unwrap()
        .last_completed_at
        .is_some());
    assert!(harness.lock.holder(Platform::Ably).is_none());
    assert!(harness
        .lock
        .running_job(Platform::Ably)
        .await
        .unwrap()
        .is_none());
    assert!(!harness.notifier.events().is_empty());
}

#[tokio::test]
async fn known_deleted_product_completes_as_not_found() {
    let scanner = MockScanner::new(Platform::Kurly, ScanMethod::Api);
    scanner.script("https://shop.example/kurly/9", ScanScript::NotFound);
    let mut scanners = StaticScannerSet::new();
    scanners.insert(Arc::new(scanner));

    let harness = Harness::build(
        WorkflowLibrary::new([validation_workflow("kurly-validation")]).unwrap(),
        scanners,
        1,
        |_| {},
    )
    .await;
    harness
        .reference
        .insert(Platform::Kurly, reference_row(Platform::Kurly, "9", "gone"));

    let job = Job::new("kurly-validation", Platform::Kurly, 0, json!({ "platform": "kurly" }));
    harness.repo.enqueue(&job).await.unwrap();

    let shutdown = CancellationToken::new();
    let handle = spawn_worker(&harness, Platform::Kurly, worker_config(&harness), shutdown.clone());
    let finished = wait_terminal(&harness, job.id, Duration::from_secs(5)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(finished.status, JobStatus::Completed, "NOT_FOUND is not an error");
    let report = classify(result_file(&harness, Platform::Kurly, job.id))
        .await
        .unwrap();
    assert_eq!(report.records[0]["status"], "not_found");
    assert_eq!(report.recount().not_found, 1);
}

#[tokio::test]
async fn higher_priority_job_runs_first() {
    let harness = Harness::build(
        WorkflowLibrary::new([fetch_only_workflow("ably-validation")]).unwrap(),
        StaticScannerSet::new(),
        1,
        |_| {},
    )
    .await;

    let low = Job::new("ably-validation", Platform::Ably, 5, json!({ "platform": "ably" }));
    let high = Job::new("ably-validation", Platform::Ably, 10, json!({ "platform": "ably" }));
    // Enqueued low-priority first; the high-priority job must still run
    // first.
    harness.repo.enqueue(&low).await.unwrap();
    harness.repo.enqueue(&high).await.unwrap();

    let shutdown = CancellationToken::new();
    let handle = spawn_worker(&harness, Platform::Ably, worker_config(&harness), shutdown.clone());
    let high_done = wait_terminal(&harness, high.id, Duration::from_secs(5)).await;
    let low_done = wait_terminal(&harness, low.id, Duration::from_secs(5)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(high_done.status, JobStatus::Completed);
    assert_eq!(low_done.status, JobStatus::Completed);
    assert!(
        high_done.completed_at.unwrap() <= low_done.started_at.unwrap(),
        "priority 10 must finish before priority 5 starts"
    );
}

#[tokio::test]
async fn lock_loss_fails_the_job_and_leaves_the_file_incomplete() {
    let scanner = MockScanner::new(Platform::Musinsa, ScanMethod::Api)
        .with_scan_duration(Duration::from_millis(50));
    for i in 0..10 {
        scanner.script(
            &format!("https://shop.example/musinsa/{i}"),
            ScanScript::Success(record(&format!("m{i}"))),
        );
    }
    let mut scanners = StaticScannerSet::new();
    scanners.insert(Arc::new(scanner));

    let harness = Harness::build(
        WorkflowLibrary::new([validation_workflow("musinsa-validation")]).unwrap(),
        scanners,
        1,
        |_| {},
    )
    .await;
    for i in 0..10 {
        harness.reference.insert(
            Platform::Musinsa,
            reference_row(Platform::Musinsa, &i.to_string(), &format!("m{i}")),
        );
    }

    let job = Job::new(
        "musinsa-validation",
        Platform::Musinsa,
        0,
        json!({ "platform": "musinsa" }),
    );
    harness.repo.enqueue(&job).await.unwrap();

    let mut config = worker_config(&harness);
    config.lock_ttl = Duration::from_millis(200); // heartbeat every 100ms

    let shutdown = CancellationToken::new();
    let handle = spawn_worker(&harness, Platform::Musinsa, config, shutdown.clone());

    // Simulate a TTL lapse (as a stalled worker would suffer) mid-scan.
    let lock = harness.lock.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        lock.expire(Platform::Musinsa);
    });

    let finished = wait_terminal(&harness, job.id, Duration::from_secs(5)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(finished.status, JobStatus::Failed);
    assert!(finished.error.unwrap().message.contains("lock lost"));

    // The worker stopped writing: header only, no footer.
    let report = classify(result_file(&harness, Platform::Musinsa, job.id))
        .await
        .unwrap();
    assert!(!report.is_complete(), "a lost lock must not finalize the file");
}

#[tokio::test]
async fn single_browser_instance_serializes_two_platforms() {
    let ably = Arc::new(
        MockScanner::new(Platform::Ably, ScanMethod::Browser)
            .with_scan_duration(Duration::from_millis(40)),
    );
    let kurly = Arc::new(
        MockScanner::new(Platform::Kurly, ScanMethod::Browser)
            .with_scan_duration(Duration::from_millis(40)),
    );
    for i in 0..2 {
        ably.script(
            &format!("https://shop.example/ably/{i}"),
            ScanScript::Success(record(&format!("a{i}"))),
        );
        kurly.script(
            &format!("https://shop.example/kurly/{i}"),
            ScanScript::Success(record(&format!("k{i}"))),
        );
    }
    let ably_events = ably.events.clone();
    let kurly_events = kurly.events.clone();

    let mut scanners = StaticScannerSet::new();
    scanners.insert(ably.clone());
    scanners.insert(kurly.clone());

    let harness = Harness::build(
        WorkflowLibrary::new([
            validation_workflow("ably-validation"),
            validation_workflow("kurly-validation"),
        ])
        .unwrap(),
        scanners,
        1, // single shared browser instance
        |_| {},
    )
    .await;
    for i in 0..2 {
        harness.reference.insert(
            Platform::Ably,
            reference_row(Platform::Ably, &i.to_string(), &format!("a{i}")),
        );
        harness.reference.insert(
            Platform::Kurly,
            reference_row(Platform::Kurly, &i.to_string(), &format!("k{i}")),
        );
    }

    let ably_job = Job::new("ably-validation", Platform::Ably, 0, json!({ "platform": "ably" }));
    let kurly_job = Job::new("kurly-validation", Platform::Kurly, 0, json!({ "platform": "kurly" }));
    harness.repo.enqueue(&ably_job).await.unwrap();
    harness.repo.enqueue(&kurly_job).await.unwrap();

    let shutdown = CancellationToken::new();
    let h1 = spawn_worker(&harness, Platform::Ably, worker_config(&harness), shutdown.clone());
    let h2 = spawn_worker(&harness, Platform::Kurly, worker_config(&harness), shutdown.clone());

    let a_done = wait_terminal(&harness, ably_job.id, Duration::from_secs(10)).await;
    let k_done = wait_terminal(&harness, kurly_job.id, Duration::from_secs(10)).await;
    shutdown.cancel();
    h1.await.unwrap();
    h2.await.unwrap();

    assert_eq!(a_done.status, JobStatus::Completed);
    assert_eq!(k_done.status, JobStatus::Completed);

    // With one instance, the two platforms' scan windows cannot overlap.
    let window = |events: &std::sync::Mutex<Vec<common::ScanEvent>>| {
        let events = events.lock().unwrap();
        (
            events.iter().map(|e| e.started).min().unwrap(),
            events.iter().map(|e| e.ended).max().unwrap(),
        )
    };
    let (a_start, a_end) = window(&ably_events);
    let (k_start, k_end) = window(&kurly_events);
    assert!(
        a_end <= k_start || k_end <= a_start,
        "scan windows overlapped: ably=({a_start:?},{a_end:?}) kurly=({k_start:?},{k_end:?})"
    );
}

#[tokio::test]
async fn repository_outage_is_survived_and_retried() {
    let harness = Harness::build(
        WorkflowLibrary::new([fetch_only_workflow("zigzag-validation")]).unwrap(),
        StaticScannerSet::new(),
        1,
        |_| {},
    )
    .await;

    harness.repo.set_unavailable(true);
    let shutdown = CancellationToken::new();
    let handle = spawn_worker(&harness, Platform::Zigzag, worker_config(&harness), shutdown.clone());

    // Let the worker hit the outage a few times, then recover.
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.repo.set_unavailable(false);

    let job = Job::new("zigzag-validation", Platform::Zigzag, 0, json!({ "platform": "zigzag" }));
    harness.repo.enqueue(&job).await.unwrap();

    let finished = wait_terminal(&harness, job.id, Duration::from_secs(5)).await;
    shutdown.cancel();
    handle.await.unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
}

#[tokio::test]
async fn queued_id_without_a_record_is_dropped_not_fatal() {
    let harness = Harness::build(
        WorkflowLibrary::new([fetch_only_workflow("hwahae-validation")]).unwrap(),
        StaticScannerSet::new(),
        1,
        |_| {},
    )
    .await;

    let ghost = Job::new("hwahae-validation", Platform::Hwahae, 0, json!({ "platform": "hwahae" }));
    harness.repo.enqueue(&ghost).await.unwrap();
    harness.repo.remove_record(ghost.id);

    let shutdown = CancellationToken::new();
    let handle = spawn_worker(&harness, Platform::Hwahae, worker_config(&harness), shutdown.clone());

    // The ghost id drains without killing the worker; a real job still runs.
    let job = Job::new("hwahae-validation", Platform::Hwahae, 0, json!({ "platform": "hwahae" }));
    harness.repo.enqueue(&job).await.unwrap();
    let finished = wait_terminal(&harness, job.id, Duration::from_secs(5)).await;
    shutdown.cancel();
    handle.await.unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
}

#[tokio::test]
async fn cancellation_requested_while_queued_cancels_before_execution() {
    let harness = Harness::build(
        WorkflowLibrary::new([fetch_only_workflow("oliveyoung-validation")]).unwrap(),
        StaticScannerSet::new(),
        1,
        |_| {},
    )
    .await;

    let job = Job::new(
        "oliveyoung-validation",
        Platform::Oliveyoung,
        0,
        json!({ "platform": "oliveyoung" }),
    );
    harness.repo.enqueue(&job).await.unwrap();
    assert!(harness.repo.request_cancel(job.id).await.unwrap());

    let shutdown = CancellationToken::new();
    let handle = spawn_worker(
        &harness,
        Platform::Oliveyoung,
        worker_config(&harness),
        shutdown.clone(),
    );
    let finished = wait_terminal(&harness, job.id, Duration::from_secs(5)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(finished.status, JobStatus::Cancelled);
    assert!(finished.started_at.is_none(), "the engine never ran it");
}
