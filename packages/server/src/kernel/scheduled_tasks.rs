//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! The daily sync enqueues one validation workflow per platform at the
//! configured hour/minute. The schedule (hour, minute) is read once at
//! startup to register the cron entry; the enabled flag is re-read at fire
//! time so it can be toggled in the store without a restart.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use scanner::Platform;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use super::jobs::{DailySyncSummary, Job, JobRepository, SchedulerStore};
use super::workflow::WorkflowLibrary;

/// Priority for daily-sync jobs: below anything an operator enqueues by
/// hand.
const DAILY_SYNC_PRIORITY: i32 = -10;

/// Start the cron scheduler with the daily-sync task registered.
pub async fn start_scheduler(
    repo: Arc<dyn JobRepository>,
    scheduler_store: Arc<dyn SchedulerStore>,
    library: Arc<WorkflowLibrary>,
    platforms: Vec<Platform>,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let state = scheduler_store.daily_sync().await?;
    let cron_expr = format!("0 {} {} * * *", state.minute, state.hour);

    let sync_repo = repo.clone();
    let sync_store = scheduler_store.clone();
    let sync_library = library.clone();
    let sync_job = CronJob::new_async(cron_expr.as_str(), move |_uuid, _lock| {
        let repo = sync_repo.clone();
        let store = sync_store.clone();
        let library = sync_library.clone();
        let platforms = platforms.clone();
        Box::pin(async move {
            if let Err(e) = run_daily_sync(&repo, &store, &library, &platforms).await {
                tracing::error!(error = %e, "daily sync failed");
            }
        })
    })?;
    scheduler.add(sync_job).await?;

    scheduler.start().await?;
    tracing::info!(
        hour = state.hour,
        minute = state.minute,
        enabled = state.enabled,
        "scheduled tasks started"
    );
    Ok(scheduler)
}

/// Enqueue a validation workflow for every platform that has one.
pub async fn run_daily_sync(
    repo: &Arc<dyn JobRepository>,
    store: &Arc<dyn SchedulerStore>,
    library: &Arc<WorkflowLibrary>,
    platforms: &[Platform],
) -> Result<()> {
    let mut state = store.daily_sync().await?;
    if !state.enabled {
        tracing::debug!("daily sync disabled, skipping");
        return Ok(());
    }

    let mut enqueued = 0u32;
    let mut synced_platforms = Vec::new();
    for &platform in platforms {
        let workflow_id = format!("{platform}-validation");
        if library.get(&workflow_id).is_none() {
            tracing::warn!(platform = %platform, workflow_id, "no validation workflow, skipping");
            continue;
        }
        let job = Job::new(
            &workflow_id,
            platform,
            DAILY_SYNC_PRIORITY,
            serde_json::json!({ "platform": platform.as_str(), "source": "daily_sync" }),
        );
        repo.enqueue(&job).await?;
        enqueued += 1;
        synced_platforms.push(platform);
        tracing::info!(job_id = %job.id, platform = %platform, "daily sync job enqueued");
    }

    state.last_run = Some(DailySyncSummary {
        ran_at: Utc::now(),
        jobs_enqueued: enqueued,
        platforms: synced_platforms,
    });
    store.save_daily_sync(&state).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::testing::{InMemoryJobRepository, InMemorySchedulerStore};
    use crate::kernel::jobs::DailySyncState;
    use crate::kernel::workflow::{NodeDefinition, WorkflowDefinition};

    fn library_for(platform: Platform) -> Arc<WorkflowLibrary> {
        let definition = WorkflowDefinition {
            id: format!("{platform}-validation"),
            version: 1,
            start_node: "fetch".to_string(),
            nodes: [(
                "fetch".to_string(),
                NodeDefinition {
                    node_type: "fetch".to_string(),
                    name: "Fetch".to_string(),
                    config: Default::default(),
                    next_node: None,
                    next_nodes: Vec::new(),
                    retry: None,
                    timeout_ms: None,
                    stop_on_error: true,
                },
            )]
            .into_iter()
            .collect(),
        };
        Arc::new(WorkflowLibrary::new([definition]).unwrap())
    }

    #[tokio::test]
    async fn disabled_sync_enqueues_nothing() {
        let repo: Arc<dyn JobRepository> = Arc::new(InMemoryJobRepository::new());
        let store: Arc<dyn SchedulerStore> = Arc::new(InMemorySchedulerStore::new());
        let library = library_for(Platform::Ably);

        run_daily_sync(&repo, &store, &library, &[Platform::Ably])
            .await
            .unwrap();
        assert_eq!(repo.queue_len(Platform::Ably).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn enabled_sync_enqueues_per_platform_and_records_summary() {
        let repo: Arc<dyn JobRepository> = Arc::new(InMemoryJobRepository::new());
        let store: Arc<dyn SchedulerStore> = Arc::new(InMemorySchedulerStore::new());
        store
            .save_daily_sync(&DailySyncState {
                enabled: true,
                hour: 5,
                minute: 30,
                last_run: None,
            })
            .await
            .unwrap();
        let library = library_for(Platform::Ably);

        run_daily_sync(&repo, &store, &library, &[Platform::Ably, Platform::Kurly])
            .await
            .unwrap();

        // Only ably has a validation workflow in the library.
        assert_eq!(repo.queue_len(Platform::Ably).await.unwrap(), 1);
        assert_eq!(repo.queue_len(Platform::Kurly).await.unwrap(), 0);

        let state = store.daily_sync().await.unwrap();
        let summary = state.last_run.unwrap();
        assert_eq!(summary.jobs_enqueued, 1);
        assert_eq!(summary.platforms, vec![Platform::Ably]);
    }
}
