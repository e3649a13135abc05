//! Bounded pool of long-lived headless-browser instances.
//!
//! Instances are launched once and shared across workers; acquisition is
//! serialized with a short-lived mutex plus a semaphore so an exhausted
//! pool blocks rather than over-allocating. Every instance handed out is
//! either connected or freshly relaunched. Page/context rotation is the
//! scan node's responsibility and never returns the instance to the pool.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use scanner::browser::{BrowserHandle, BrowserLauncher};
use scanner::ScanError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct Slot {
    browser: Arc<dyn BrowserHandle>,
    in_use: bool,
    created_at: Instant,
}

pub struct BrowserPool {
    launcher: Arc<dyn BrowserLauncher>,
    slots: Mutex<Vec<Slot>>,
    permits: Arc<Semaphore>,
    size: usize,
}

/// Point-in-time pool accounting; `in_use + available == size` always.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub size: usize,
    pub in_use: usize,
    pub available: usize,
}

impl BrowserPool {
    /// Launch `size` instances in parallel and build the pool.
    pub async fn initialize(
        launcher: Arc<dyn BrowserLauncher>,
        size: usize,
    ) -> Result<Self, ScanError> {
        let launches = (0..size).map(|_| launcher.launch());
        let browsers = futures::future::try_join_all(launches).await?;

        let slots = browsers
            .into_iter()
            .map(|browser| Slot {
                browser,
                in_use: false,
                created_at: Instant::now(),
            })
            .collect();

        tracing::info!(size, "browser pool initialized");
        Ok(Self {
            launcher,
            slots: Mutex::new(slots),
            permits: Arc::new(Semaphore::new(size)),
            size,
        })
    }

    /// Borrow an instance; blocks while the pool is exhausted.
    ///
    /// The returned guard releases the slot on drop, on every exit path.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledBrowser, ScanError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ScanError::BrowserCrashed("pool closed".to_string()))?;

        let (index, browser) = {
            let mut slots = self.slots.lock().unwrap();
            // The semaphore admits at most `size` holders, so a free slot
            // exists whenever a permit was granted.
            let Some(index) = slots.iter().position(|s| !s.in_use) else {
                return Err(ScanError::BrowserCrashed(
                    "pool accounting violated: no free slot under permit".to_string(),
                ));
            };
            slots[index].in_use = true;
            (index, slots[index].browser.clone())
        };

        // Health check outside the slot mutex; replace dead instances.
        let browser = if browser.is_connected().await {
            browser
        } else {
            tracing::warn!(slot = index, "browser disconnected, relaunching");
            match self.launcher.launch().await {
                Ok(fresh) => {
                    let mut slots = self.slots.lock().unwrap();
                    slots[index].browser = fresh.clone();
                    slots[index].created_at = Instant::now();
                    fresh
                }
                Err(e) => {
                    let mut slots = self.slots.lock().unwrap();
                    slots[index].in_use = false;
                    drop(slots);
                    drop(permit);
                    return Err(e);
                }
            }
        };

        Ok(PooledBrowser {
            pool: self.clone(),
            browser,
            index,
            _permit: permit,
        })
    }

    /// Replace the instance in a held slot (e.g. after a mid-scan crash).
    pub async fn replace(&self, held: &mut PooledBrowser) -> Result<(), ScanError> {
        let fresh = self.launcher.launch().await?;
        {
            let mut slots = self.slots.lock().unwrap();
            slots[held.index].browser = fresh.clone();
            slots[held.index].created_at = Instant::now();
        }
        held.browser = fresh;
        Ok(())
    }

    pub fn status(&self) -> PoolStatus {
        let slots = self.slots.lock().unwrap();
        let in_use = slots.iter().filter(|s| s.in_use).count();
        PoolStatus {
            size: self.size,
            in_use,
            available: self.size - in_use,
        }
    }

    /// Close every instance. Idempotent.
    pub async fn cleanup(&self) {
        let browsers: Vec<Arc<dyn BrowserHandle>> = {
            let slots = self.slots.lock().unwrap();
            slots.iter().map(|s| s.browser.clone()).collect()
        };
        for browser in browsers {
            if let Err(e) = browser.close().await {
                tracing::debug!(error = %e, "browser close failed during cleanup");
            }
        }
        tracing::info!("browser pool cleaned up");
    }

    fn release_slot(&self, index: usize) {
        let mut slots = self.slots.lock().unwrap();
        slots[index].in_use = false;
    }
}

/// RAII borrow of one pool slot.
pub struct PooledBrowser {
    pool: Arc<BrowserPool>,
    browser: Arc<dyn BrowserHandle>,
    index: usize,
    _permit: OwnedSemaphorePermit,
}

impl PooledBrowser {
    pub fn browser(&self) -> &Arc<dyn BrowserHandle> {
        &self.browser
    }
}

impl Drop for PooledBrowser {
    fn drop(&mut self) {
        self.pool.release_slot(self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner::testing::{FakeLauncher, FakePage};
    use std::time::Duration;

    async fn pool_of(size: usize) -> (Arc<BrowserPool>, Arc<FakeLauncher>) {
        let launcher = Arc::new(FakeLauncher::new(FakePage::default()));
        let pool = Arc::new(
            BrowserPool::initialize(launcher.clone(), size)
                .await
                .unwrap(),
        );
        (pool, launcher)
    }

    #[tokio::test]
    async fn initialize_launches_exactly_pool_size() {
        let (pool, launcher) = pool_of(3).await;
        assert_eq!(launcher.launch_count(), 3);
        assert_eq!(
            pool.status(),
            PoolStatus {
                size: 3,
                in_use: 0,
                available: 3
            }
        );
    }

    #[tokio::test]
    async fn accounting_holds_through_acquire_and_release() {
        let (pool, _) = pool_of(2).await;
        let a = pool.acquire().await.unwrap();
        let status = pool.status();
        assert_eq!(status.in_use, 1);
        assert_eq!(status.in_use + status.available, status.size);
        drop(a);
        assert_eq!(pool.status().available, 2);
    }

    #[tokio::test]
    async fn exhausted_pool_blocks_until_release() {
        let (pool, _) = pool_of(1).await;
        let held = pool.acquire().await.unwrap();

        let contender = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished(), "second acquire must block");

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("acquire should unblock")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn disconnected_instance_is_replaced_on_acquire() {
        let (pool, launcher) = pool_of(1).await;
        launcher.browsers()[0].disconnect();

        let held = pool.acquire().await.unwrap();
        assert!(held.browser().is_connected().await);
        assert_eq!(launcher.launch_count(), 2, "one relaunch");
    }

    #[tokio::test]
    async fn replace_swaps_the_instance_in_place() {
        let (pool, launcher) = pool_of(1).await;
        let mut held = pool.acquire().await.unwrap();
        launcher.browsers()[0].disconnect();
        pool.replace(&mut held).await.unwrap();
        assert!(held.browser().is_connected().await);
        assert_eq!(pool.status().in_use, 1);
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let (pool, launcher) = pool_of(2).await;
        pool.cleanup().await;
        pool.cleanup().await;
        for browser in launcher.browsers() {
            assert!(!browser.is_connected().await);
        }
    }
}
