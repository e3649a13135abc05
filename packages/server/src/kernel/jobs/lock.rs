//! Platform lock: a distributed mutex granting one active job per platform
//! across the cluster.
//!
//! Keys: `lock:platform:<platform>` holds the owner token with a TTL;
//! `lock:running:<platform>` mirrors the active job id for observability.
//! Release and heartbeat are check-and-act Lua scripts so a worker that
//! lost its lock to a TTL expiry can never delete or extend a re-acquirer's
//! lock.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use scanner::Platform;
use uuid::Uuid;

use super::repository::RepositoryError;

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

const HEARTBEAT_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
"#;

#[async_trait]
pub trait PlatformLock: Send + Sync {
    /// Set-if-absent with TTL; true iff the caller now holds the lock.
    async fn acquire(
        &self,
        platform: Platform,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, RepositoryError>;

    /// Check-and-delete; a no-op when a different owner holds the lock.
    /// Double release by the same owner is safe.
    async fn release(&self, platform: Platform, holder: &str) -> Result<(), RepositoryError>;

    /// Extend the TTL. Returns false when the lock was lost (expired or
    /// taken over); the caller must stop mutating job state.
    async fn heartbeat(
        &self,
        platform: Platform,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, RepositoryError>;

    async fn set_running_job(
        &self,
        platform: Platform,
        job_id: Uuid,
    ) -> Result<(), RepositoryError>;

    async fn clear_running_job(&self, platform: Platform) -> Result<(), RepositoryError>;

    /// Observability read of the running-job mirror.
    async fn running_job(&self, platform: Platform) -> Result<Option<Uuid>, RepositoryError>;
}

fn lock_key(platform: Platform) -> String {
    format!("lock:platform:{platform}")
}

fn running_key(platform: Platform) -> String {
    format!("lock:running:{platform}")
}

/// Redis-backed platform lock.
#[derive(Clone)]
pub struct RedisPlatformLock {
    con: redis::aio::ConnectionManager,
}

impl RedisPlatformLock {
    pub fn new(con: redis::aio::ConnectionManager) -> Self {
        Self { con }
    }
}

#[async_trait]
impl PlatformLock for RedisPlatformLock {
    async fn acquire(
        &self,
        platform: Platform,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, RepositoryError> {
        let mut con = self.con.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(lock_key(platform))
            .arg(holder)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut con)
            .await?;
        Ok(acquired.is_some())
    }

    async fn release(&self, platform: Platform, holder: &str) -> Result<(), RepositoryError> {
        let mut con = self.con.clone();
        let deleted: i32 = redis::Script::new(RELEASE_SCRIPT)
            .key(lock_key(platform))
            .arg(holder)
            .invoke_async(&mut con)
            .await?;
        if deleted == 0 {
            tracing::debug!(platform = %platform, holder, "release was a no-op (not the owner)");
        }
        Ok(())
    }

    async fn heartbeat(
        &self,
        platform: Platform,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, RepositoryError> {
        let mut con = self.con.clone();
        let extended: i32 = redis::Script::new(HEARTBEAT_SCRIPT)
            .key(lock_key(platform))
            .arg(holder)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut con)
            .await?;
        Ok(extended == 1)
    }

    async fn set_running_job(
        &self,
        platform: Platform,
        job_id: Uuid,
    ) -> Result<(), RepositoryError> {
        let mut con = self.con.clone();
        let _: () = con.set(running_key(platform), job_id.to_string()).await?;
        Ok(())
    }

    async fn clear_running_job(&self, platform: Platform) -> Result<(), RepositoryError> {
        let mut con = self.con.clone();
        let _: () = con.del(running_key(platform)).await?;
        Ok(())
    }

    async fn running_job(&self, platform: Platform) -> Result<Option<Uuid>, RepositoryError> {
        let mut con = self.con.clone();
        let raw: Option<String> = con.get(running_key(platform)).await?;
        Ok(raw.and_then(|s| s.parse().ok()))
    }
}
