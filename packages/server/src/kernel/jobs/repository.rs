//! Job repository: durable store of jobs, per-platform queues and the
//! recent-jobs observability list.
//!
//! Key layout:
//! - `job:<id>` — serialized job record; TTL applied on terminal states.
//! - `queue:<platform>` — sorted set, score `-priority`, member = job id.
//!   `ZPOPMIN` therefore pops the highest priority first and breaks ties by
//!   member order, which is insertion order because ids are UUIDv7.
//! - `recent:<platform>` — capped id list for observability reads.
//! - `job_cancel:<id>` — cancellation flag polled by the engine.
//!
//! The repository does not enforce the platform lock; dequeue callers hold
//! it by discipline, which keeps queue and lock in one consistency domain.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use scanner::Platform;
use thiserror::Error;
use uuid::Uuid;

use super::job::Job;

/// TTL applied to job records once they reach a terminal state.
pub const TERMINAL_JOB_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

const RECENT_CAP: isize = 100;

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The backing store is unreachable (spec: `QueueUnavailable`).
    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt record at {key}: {message}")]
    Corrupt { key: String, message: String },
}

impl From<redis::RedisError> for RepositoryError {
    fn from(err: redis::RedisError) -> Self {
        RepositoryError::Unavailable(err.to_string())
    }
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Persist the job and push its id onto the platform queue.
    async fn enqueue(&self, job: &Job) -> Result<(), RepositoryError>;

    /// Pop the highest-priority job id; atomic across concurrent callers.
    async fn dequeue(&self, platform: Platform) -> Result<Option<Uuid>, RepositoryError>;

    /// Non-blocking queue length; never requires the platform lock.
    async fn queue_len(&self, platform: Platform) -> Result<usize, RepositoryError>;

    async fn load(&self, id: Uuid) -> Result<Option<Job>, RepositoryError>;

    /// Idempotent save. Terminal jobs get [`TERMINAL_JOB_TTL`].
    async fn save(&self, job: &Job) -> Result<(), RepositoryError>;

    /// Read-only observability over recently enqueued jobs.
    async fn list_recent(&self, platform: Platform, n: usize)
        -> Result<Vec<Job>, RepositoryError>;

    /// Flag a job for cooperative cancellation. Returns false when the job
    /// record does not exist.
    async fn request_cancel(&self, id: Uuid) -> Result<bool, RepositoryError>;

    async fn cancel_requested(&self, id: Uuid) -> Result<bool, RepositoryError>;
}

fn job_key(id: Uuid) -> String {
    format!("job:{id}")
}

fn queue_key(platform: Platform) -> String {
    format!("queue:{platform}")
}

fn recent_key(platform: Platform) -> String {
    format!("recent:{platform}")
}

fn cancel_key(id: Uuid) -> String {
    format!("job_cancel:{id}")
}

/// Redis-backed repository.
#[derive(Clone)]
pub struct RedisJobRepository {
    con: redis::aio::ConnectionManager,
}

impl RedisJobRepository {
    pub fn new(con: redis::aio::ConnectionManager) -> Self {
        Self { con }
    }

    pub async fn connect(url: &str) -> Result<Self, RepositoryError> {
        let client = redis::Client::open(url)
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;
        let con = client.get_connection_manager().await?;
        Ok(Self::new(con))
    }
}

#[async_trait]
impl JobRepository for RedisJobRepository {
    async fn enqueue(&self, job: &Job) -> Result<(), RepositoryError> {
        let mut con = self.con.clone();
        let raw = serde_json::to_string(job)?;

        // Job record first, then the queue push: a worker that observes the
        // queued id before the record materializes waits and retries, so
        // this order keeps the window harmless.
        let _: () = con.set(job_key(job.id), raw).await?;
        let _: () = con
            .zadd(
                queue_key(job.platform),
                job.id.to_string(),
                -(job.priority as f64),
            )
            .await?;
        let _: () = con.lpush(recent_key(job.platform), job.id.to_string()).await?;
        let _: () = con.ltrim(recent_key(job.platform), 0, RECENT_CAP - 1).await?;

        tracing::debug!(job_id = %job.id, platform = %job.platform, priority = job.priority, "job enqueued");
        Ok(())
    }

    async fn dequeue(&self, platform: Platform) -> Result<Option<Uuid>, RepositoryError> {
        let mut con = self.con.clone();
        let popped: Vec<(String, f64)> = redis::cmd("ZPOPMIN")
            .arg(queue_key(platform))
            .arg(1)
            .query_async(&mut con)
            .await?;

        match popped.into_iter().next() {
            None => Ok(None),
            Some((member, _score)) => {
                let id = member.parse::<Uuid>().map_err(|e| RepositoryError::Corrupt {
                    key: queue_key(platform),
                    message: e.to_string(),
                })?;
                Ok(Some(id))
            }
        }
    }

    async fn queue_len(&self, platform: Platform) -> Result<usize, RepositoryError> {
        let mut con = self.con.clone();
        let len: i64 = con.zcard(queue_key(platform)).await?;
        Ok(len.max(0) as usize)
    }

    async fn load(&self, id: Uuid) -> Result<Option<Job>, RepositoryError> {
        let mut con = self.con.clone();
        let raw: Option<String> = con.get(job_key(id)).await?;
        match raw {
            None => Ok(None),
            Some(raw) => {
                let job = serde_json::from_str(&raw).map_err(|e| RepositoryError::Corrupt {
                    key: job_key(id),
                    message: e.to_string(),
                })?;
                Ok(Some(job))
            }
        }
    }

    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        let mut con = self.con.clone();
        let raw = serde_json::to_string(job)?;
        if job.status.is_terminal() {
            let _: () = con
                .set_ex(job_key(job.id), raw, TERMINAL_JOB_TTL.as_secs())
                .await?;
        } else {
            let _: () = con.set(job_key(job.id), raw).await?;
        }
        Ok(())
    }

    async fn list_recent(
        &self,
        platform: Platform,
        n: usize,
    ) -> Result<Vec<Job>, RepositoryError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut con = self.con.clone();
        let ids: Vec<String> = con
            .lrange(recent_key(platform), 0, (n - 1) as isize)
            .await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for raw_id in ids {
            let Ok(id) = raw_id.parse::<Uuid>() else {
                continue;
            };
            if let Some(job) = self.load(id).await? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    async fn request_cancel(&self, id: Uuid) -> Result<bool, RepositoryError> {
        if self.load(id).await?.is_none() {
            return Ok(false);
        }
        let mut con = self.con.clone();
        let _: () = con
            .set_ex(cancel_key(id), 1, Duration::from_secs(24 * 60 * 60).as_secs())
            .await?;
        Ok(true)
    }

    async fn cancel_requested(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let mut con = self.con.clone();
        let exists: bool = con.exists(cancel_key(id)).await?;
        Ok(exists)
    }
}
