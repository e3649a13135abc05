//! Scheduler state: per-platform completion bookkeeping plus the global
//! daily-sync schedule, stored as JSON at `scheduler:<scope>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use scanner::Platform;
use serde::{Deserialize, Serialize};

use super::repository::RepositoryError;

/// Per-platform scheduler record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformSchedule {
    pub last_completed_at: Option<DateTime<Utc>>,
    pub next_eligible_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
}

/// Global daily-sync scheduler state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySyncState {
    pub enabled: bool,
    pub hour: u8,
    pub minute: u8,
    pub last_run: Option<DailySyncSummary>,
}

impl Default for DailySyncState {
    fn default() -> Self {
        Self {
            enabled: false,
            hour: 5,
            minute: 0,
            last_run: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySyncSummary {
    pub ran_at: DateTime<Utc>,
    pub jobs_enqueued: u32,
    pub platforms: Vec<Platform>,
}

#[async_trait]
pub trait SchedulerStore: Send + Sync {
    async fn platform_schedule(
        &self,
        platform: Platform,
    ) -> Result<PlatformSchedule, RepositoryError>;

    /// Record a job completion timestamp for the platform.
    async fn set_job_completed_at(
        &self,
        platform: Platform,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn touch_heartbeat(&self, platform: Platform) -> Result<(), RepositoryError>;

    async fn daily_sync(&self) -> Result<DailySyncState, RepositoryError>;

    async fn save_daily_sync(&self, state: &DailySyncState) -> Result<(), RepositoryError>;
}

fn schedule_key(platform: Platform) -> String {
    format!("scheduler:{platform}")
}

const DAILY_SYNC_KEY: &str = "scheduler:daily_sync";

/// Redis-backed scheduler store.
#[derive(Clone)]
pub struct RedisSchedulerStore {
    con: redis::aio::ConnectionManager,
}

impl RedisSchedulerStore {
    pub fn new(con: redis::aio::ConnectionManager) -> Self {
        Self { con }
    }

    async fn read_schedule(&self, platform: Platform) -> Result<PlatformSchedule, RepositoryError> {
        let mut con = self.con.clone();
        let raw: Option<String> = con.get(schedule_key(platform)).await?;
        Ok(raw
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default())
    }

    async fn write_schedule(
        &self,
        platform: Platform,
        schedule: &PlatformSchedule,
    ) -> Result<(), RepositoryError> {
        let mut con = self.con.clone();
        let raw = serde_json::to_string(schedule)?;
        let _: () = con.set(schedule_key(platform), raw).await?;
        Ok(())
    }
}

#[async_trait]
impl SchedulerStore for RedisSchedulerStore {
    async fn platform_schedule(
        &self,
        platform: Platform,
    ) -> Result<PlatformSchedule, RepositoryError> {
        self.read_schedule(platform).await
    }

    async fn set_job_completed_at(
        &self,
        platform: Platform,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut schedule = self.read_schedule(platform).await?;
        schedule.last_completed_at = Some(at);
        self.write_schedule(platform, &schedule).await
    }

    async fn touch_heartbeat(&self, platform: Platform) -> Result<(), RepositoryError> {
        let mut schedule = self.read_schedule(platform).await?;
        schedule.heartbeat_at = Some(Utc::now());
        self.write_schedule(platform, &schedule).await
    }

    async fn daily_sync(&self) -> Result<DailySyncState, RepositoryError> {
        let mut con = self.con.clone();
        let raw: Option<String> = con.get(DAILY_SYNC_KEY).await?;
        Ok(raw
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default())
    }

    async fn save_daily_sync(&self, state: &DailySyncState) -> Result<(), RepositoryError> {
        let mut con = self.con.clone();
        let raw = serde_json::to_string(state)?;
        let _: () = con.set(DAILY_SYNC_KEY, raw).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_sync_defaults_to_disabled_early_morning() {
        let state = DailySyncState::default();
        assert!(!state.enabled);
        assert_eq!((state.hour, state.minute), (5, 0));
    }

    #[test]
    fn schedule_keys_are_scoped() {
        assert_eq!(schedule_key(Platform::Hwahae), "scheduler:hwahae");
    }
}
