//! In-memory repository, lock and scheduler-store implementations.
//!
//! These carry the same contracts as the Redis implementations (priority
//! ordering, lock TTL semantics, check-and-delete release) so engine and
//! worker tests run without a backing store. Lock TTLs use the tokio clock
//! and therefore respect paused-time tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scanner::Platform;
use tokio::time::Instant;
use uuid::Uuid;

use super::job::Job;
use super::lock::PlatformLock;
use super::repository::{JobRepository, RepositoryError};
use super::scheduler::{DailySyncState, PlatformSchedule, SchedulerStore};

#[derive(Debug, Clone)]
struct QueueEntry {
    priority: i32,
    seq: u64,
    id: Uuid,
}

/// In-memory job repository.
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: Mutex<HashMap<Uuid, Job>>,
    queues: Mutex<HashMap<Platform, Vec<QueueEntry>>>,
    recents: Mutex<HashMap<Platform, Vec<Uuid>>>,
    cancels: Mutex<HashMap<Uuid, bool>>,
    seq: AtomicU64,
    unavailable: AtomicBool,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backing-store outage: every call fails with
    /// `RepositoryError::Unavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }

    /// Test hook: drop a job record while leaving its queue entry, to
    /// reproduce the record-not-yet-materialized window.
    pub fn remove_record(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().unwrap().remove(&id)
    }

    /// Test hook: restore a job record.
    pub fn put_record(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn enqueue(&self, job: &Job) -> Result<(), RepositoryError> {
        self.check_available()?;
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        self.queues
            .lock()
            .unwrap()
            .entry(job.platform)
            .or_default()
            .push(QueueEntry {
                priority: job.priority,
                seq: self.seq.fetch_add(1, Ordering::SeqCst),
                id: job.id,
            });
        let mut recents = self.recents.lock().unwrap();
        let list = recents.entry(job.platform).or_default();
        list.insert(0, job.id);
        list.truncate(100);
        Ok(())
    }

    async fn dequeue(&self, platform: Platform) -> Result<Option<Uuid>, RepositoryError> {
        self.check_available()?;
        let mut queues = self.queues.lock().unwrap();
        let Some(queue) = queues.get_mut(&platform) else {
            return Ok(None);
        };
        // Highest priority first; ties go to the earliest insertion.
        let best = queue
            .iter()
            .enumerate()
            .max_by_key(|(_, e)| (e.priority, std::cmp::Reverse(e.seq)))
            .map(|(i, _)| i);
        Ok(best.map(|i| queue.remove(i).id))
    }

    async fn queue_len(&self, platform: Platform) -> Result<usize, RepositoryError> {
        self.check_available()?;
        Ok(self
            .queues
            .lock()
            .unwrap()
            .get(&platform)
            .map_or(0, Vec::len))
    }

    async fn load(&self, id: Uuid) -> Result<Option<Job>, RepositoryError> {
        self.check_available()?;
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        self.check_available()?;
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn list_recent(
        &self,
        platform: Platform,
        n: usize,
    ) -> Result<Vec<Job>, RepositoryError> {
        self.check_available()?;
        let ids: Vec<Uuid> = self
            .recents
            .lock()
            .unwrap()
            .get(&platform)
            .map(|l| l.iter().take(n).copied().collect())
            .unwrap_or_default();
        let jobs = self.jobs.lock().unwrap();
        Ok(ids.into_iter().filter_map(|id| jobs.get(&id).cloned()).collect())
    }

    async fn request_cancel(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.check_available()?;
        if !self.jobs.lock().unwrap().contains_key(&id) {
            return Ok(false);
        }
        self.cancels.lock().unwrap().insert(id, true);
        Ok(true)
    }

    async fn cancel_requested(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.check_available()?;
        Ok(self.cancels.lock().unwrap().get(&id).copied().unwrap_or(false))
    }
}

struct HeldLock {
    holder: String,
    expires_at: Instant,
}

/// In-memory platform lock with real TTL semantics.
#[derive(Default)]
pub struct InMemoryPlatformLock {
    locks: Mutex<HashMap<Platform, HeldLock>>,
    running: Mutex<HashMap<Platform, Uuid>>,
}

impl InMemoryPlatformLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: force-expire a platform's lock, as a TTL lapse would.
    pub fn expire(&self, platform: Platform) {
        self.locks.lock().unwrap().remove(&platform);
    }

    pub fn holder(&self, platform: Platform) -> Option<String> {
        let locks = self.locks.lock().unwrap();
        locks
            .get(&platform)
            .filter(|l| l.expires_at > Instant::now())
            .map(|l| l.holder.clone())
    }
}

#[async_trait]
impl PlatformLock for InMemoryPlatformLock {
    async fn acquire(
        &self,
        platform: Platform,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, RepositoryError> {
        let mut locks = self.locks.lock().unwrap();
        match locks.get(&platform) {
            Some(held) if held.expires_at > Instant::now() => Ok(false),
            _ => {
                locks.insert(
                    platform,
                    HeldLock {
                        holder: holder.to_string(),
                        expires_at: Instant::now() + ttl,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn release(&self, platform: Platform, holder: &str) -> Result<(), RepositoryError> {
        let mut locks = self.locks.lock().unwrap();
        if locks.get(&platform).is_some_and(|l| l.holder == holder) {
            locks.remove(&platform);
        }
        Ok(())
    }

    async fn heartbeat(
        &self,
        platform: Platform,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, RepositoryError> {
        let mut locks = self.locks.lock().unwrap();
        match locks.get_mut(&platform) {
            Some(held) if held.holder == holder && held.expires_at > Instant::now() => {
                held.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_running_job(
        &self,
        platform: Platform,
        job_id: Uuid,
    ) -> Result<(), RepositoryError> {
        self.running.lock().unwrap().insert(platform, job_id);
        Ok(())
    }

    async fn clear_running_job(&self, platform: Platform) -> Result<(), RepositoryError> {
        self.running.lock().unwrap().remove(&platform);
        Ok(())
    }

    async fn running_job(&self, platform: Platform) -> Result<Option<Uuid>, RepositoryError> {
        Ok(self.running.lock().unwrap().get(&platform).copied())
    }
}

/// In-memory scheduler store.
#[derive(Default)]
pub struct InMemorySchedulerStore {
    schedules: Mutex<HashMap<Platform, PlatformSchedule>>,
    daily_sync: Mutex<DailySyncState>,
}

impl InMemorySchedulerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchedulerStore for InMemorySchedulerStore {
    async fn platform_schedule(
        &self,
        platform: Platform,
    ) -> Result<PlatformSchedule, RepositoryError> {
        Ok(self
            .schedules
            .lock()
            .unwrap()
            .get(&platform)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_job_completed_at(
        &self,
        platform: Platform,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.schedules
            .lock()
            .unwrap()
            .entry(platform)
            .or_default()
            .last_completed_at = Some(at);
        Ok(())
    }

    async fn touch_heartbeat(&self, platform: Platform) -> Result<(), RepositoryError> {
        self.schedules
            .lock()
            .unwrap()
            .entry(platform)
            .or_default()
            .heartbeat_at = Some(Utc::now());
        Ok(())
    }

    async fn daily_sync(&self) -> Result<DailySyncState, RepositoryError> {
        Ok(self.daily_sync.lock().unwrap().clone())
    }

    async fn save_daily_sync(&self, state: &DailySyncState) -> Result<(), RepositoryError> {
        *self.daily_sync.lock().unwrap() = state.clone();
        Ok(())
    }
}
