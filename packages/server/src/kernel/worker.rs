//! Per-platform worker loop.
//!
//! One long-running loop per platform: poll the queue, take the platform
//! lock, dequeue, execute the workflow, and in the cleanup path record the
//! completion timestamp, clear the running-job mirror and release the
//! lock. Intra-platform concurrency is exactly 1 by construction; a
//! process runs one loop per platform in its configured platform set.
//!
//! The lock is heartbeated at ttl/2 while a job runs; a failed heartbeat
//! trips the job's lock-lost signal so the engine stops writing and the
//! worker skips finalizing the result file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use scanner::Platform;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::jobs::{JobRepository, PlatformLock, RepositoryError, SchedulerStore};
use super::results::ResultWriter;
use super::workflow::{JobSignals, SharedState, WorkflowEngine, RESULT_WRITER_KEY};

/// How many times to re-read a dequeued id whose record has not
/// materialized yet (the repository has no multi-key transactions).
const RECORD_WAIT_ATTEMPTS: u32 = 5;
const RECORD_WAIT_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identifies this worker as the lock holder.
    pub worker_id: String,
    pub poll_interval: Duration,
    pub lock_ttl: Duration,
    pub results_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            poll_interval: Duration::from_secs(1),
            lock_ttl: Duration::from_secs(600),
            results_dir: PathBuf::from("results"),
        }
    }
}

pub struct PlatformWorker {
    platform: Platform,
    repo: Arc<dyn JobRepository>,
    lock: Arc<dyn PlatformLock>,
    scheduler: Arc<dyn SchedulerStore>,
    engine: Arc<WorkflowEngine>,
    config: WorkerConfig,
}

impl PlatformWorker {
    pub fn new(
        platform: Platform,
        repo: Arc<dyn JobRepository>,
        lock: Arc<dyn PlatformLock>,
        scheduler: Arc<dyn SchedulerStore>,
        engine: Arc<WorkflowEngine>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            platform,
            repo,
            lock,
            scheduler,
            engine,
            config,
        }
    }

    /// Run until shutdown. Job failures are local; only shutdown ends the
    /// loop.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            platform = %self.platform,
            worker_id = %self.config.worker_id,
            "platform worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.repo.queue_len(self.platform).await {
                Ok(0) => {
                    self.idle(&shutdown).await;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    // Backing store unavailable: retryable iteration.
                    tracing::warn!(platform = %self.platform, error = %e, "queue poll failed");
                    self.idle(&shutdown).await;
                    continue;
                }
            }

            let acquired = self
                .lock
                .acquire(self.platform, &self.config.worker_id, self.config.lock_ttl)
                .await;
            match acquired {
                Ok(true) => {}
                Ok(false) => {
                    self.idle(&shutdown).await;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(platform = %self.platform, error = %e, "lock acquire failed");
                    self.idle(&shutdown).await;
                    continue;
                }
            }

            let outcome = self.run_one(&shutdown).await;

            // Cleanup path, in lock-discipline order.
            if matches!(outcome, Ok(true)) {
                if let Err(e) = self
                    .scheduler
                    .set_job_completed_at(self.platform, Utc::now())
                    .await
                {
                    tracing::warn!(platform = %self.platform, error = %e, "scheduler update failed");
                }
            }
            if let Err(e) = self.lock.clear_running_job(self.platform).await {
                tracing::warn!(platform = %self.platform, error = %e, "clear running job failed");
            }
            if let Err(e) = self
                .lock
                .release(self.platform, &self.config.worker_id)
                .await
            {
                tracing::warn!(platform = %self.platform, error = %e, "lock release failed");
            }

            if let Err(e) = outcome {
                tracing::warn!(platform = %self.platform, error = %e, "iteration failed, will retry");
                self.idle(&shutdown).await;
            }
        }

        tracing::info!(platform = %self.platform, "platform worker stopped");
    }

    async fn idle(&self, shutdown: &CancellationToken) {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.config.poll_interval) => {}
        }
    }

    /// One locked iteration. `Ok(true)` means a job ran to a terminal
    /// state; `Ok(false)` means the queue was empty or the record never
    /// materialized.
    async fn run_one(&self, shutdown: &CancellationToken) -> Result<bool, RepositoryError> {
        let Some(job_id) = self.repo.dequeue(self.platform).await? else {
            return Ok(false);
        };

        // The job record is written before the queue push, but the store
        // has no multi-key transactions; tolerate the partial-visibility
        // window with a bounded wait.
        let mut job = None;
        for attempt in 0..RECORD_WAIT_ATTEMPTS {
            if let Some(found) = self.repo.load(job_id).await? {
                job = Some(found);
                break;
            }
            tracing::debug!(job_id = %job_id, attempt, "queued id without record, waiting");
            tokio::time::sleep(RECORD_WAIT_DELAY).await;
        }
        let Some(mut job) = job else {
            tracing::warn!(job_id = %job_id, "dropping queued id whose record never materialized");
            return Ok(false);
        };

        // Cancellation may have arrived while the job was still queued.
        if self.repo.cancel_requested(job.id).await? {
            job.cancel();
            self.repo.save(&job).await?;
            return Ok(true);
        }

        self.lock.set_running_job(self.platform, job.id).await?;

        let signals = JobSignals {
            cancel: shutdown.child_token(),
            lock_lost: CancellationToken::new(),
        };
        let heartbeat = self.spawn_heartbeat(&signals);

        // Open the per-job result file and park it in shared state for the
        // save node.
        let shared = SharedState::new();
        let writer = match ResultWriter::open(
            &self.config.results_dir,
            self.platform,
            job.id,
            &job.workflow_id,
        )
        .await
        {
            Ok(writer) => {
                let writer = Arc::new(Mutex::new(writer));
                shared.insert(RESULT_WRITER_KEY, writer.clone());
                Some(writer)
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "result writer open failed");
                None
            }
        };

        tracing::info!(
            job_id = %job.id,
            platform = %self.platform,
            workflow_id = %job.workflow_id,
            priority = job.priority,
            "job starting"
        );
        self.engine.execute(&mut job, shared, &signals).await;

        heartbeat.abort();

        if signals.lock_lost.is_cancelled() {
            // Another worker may own the platform now; stop touching the
            // result file and leave the job record as the engine marked it.
            tracing::error!(job_id = %job.id, platform = %self.platform, "lock lost during job");
            return Ok(true);
        }

        if let Some(writer) = writer {
            if let Err(e) = writer.lock().await.finalize(job.status).await {
                tracing::warn!(job_id = %job.id, error = %e, "result finalize failed");
            }
        }
        self.repo.save(&job).await?;

        tracing::info!(job_id = %job.id, status = %job.status, "job finished");
        Ok(true)
    }

    fn spawn_heartbeat(&self, signals: &JobSignals) -> tokio::task::JoinHandle<()> {
        let lock = self.lock.clone();
        let platform = self.platform;
        let holder = self.config.worker_id.clone();
        let ttl = self.config.lock_ttl;
        let lock_lost = signals.lock_lost.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ttl / 2);
            interval.tick().await; // skip the immediate tick

            loop {
                interval.tick().await;
                match lock.heartbeat(platform, &holder, ttl).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::error!(platform = %platform, "lock heartbeat rejected: lock lost");
                        lock_lost.cancel();
                        break;
                    }
                    Err(e) => {
                        // Unknown lock state; keep trying until the TTL
                        // decides it.
                        tracing::warn!(platform = %platform, error = %e, "lock heartbeat failed");
                    }
                }
            }
        })
    }
}

/// Spawn one worker per platform in the set; returns the join handles.
pub fn spawn_platform_workers(
    platforms: &[Platform],
    repo: Arc<dyn JobRepository>,
    lock: Arc<dyn PlatformLock>,
    scheduler: Arc<dyn SchedulerStore>,
    engine: Arc<WorkflowEngine>,
    config: WorkerConfig,
    shutdown: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    platforms
        .iter()
        .map(|&platform| {
            let worker = PlatformWorker::new(
                platform,
                repo.clone(),
                lock.clone(),
                scheduler.clone(),
                engine.clone(),
                config.clone(),
            );
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(shutdown).await })
        })
        .collect()
}
