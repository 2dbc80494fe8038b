//! Periodic maintenance tasks.
//!
//! Each job runs on its own tokio interval for the lifetime of the process.
//! Jobs are idempotent, so a skipped or repeated tick is harmless.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{error, info};

use crate::{
    error::AppError,
    models::activity_log::retention_cutoff,
    store::{LogStore, PostStore, SharedStore, Store, StoryStore},
};

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceJob {
    /// Re-applies the popularity scorer to every post.
    RescorePosts,
    /// Deactivates expired stories that were not featured.
    ArchiveStories,
    /// Deletes activity logs older than one month.
    PurgeLogs,
}

impl MaintenanceJob {
    pub const ALL: [MaintenanceJob; 3] = [
        MaintenanceJob::RescorePosts,
        MaintenanceJob::ArchiveStories,
        MaintenanceJob::PurgeLogs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MaintenanceJob::RescorePosts => "rescore_posts",
            MaintenanceJob::ArchiveStories => "archive_stories",
            MaintenanceJob::PurgeLogs => "purge_logs",
        }
    }

    pub fn period(&self) -> Duration {
        match self {
            MaintenanceJob::ArchiveStories => HOUR,
            MaintenanceJob::RescorePosts | MaintenanceJob::PurgeLogs => DAY,
        }
    }

    /// Runs the job once and returns how many rows it touched.
    pub async fn run_once(&self, store: &dyn Store, now: DateTime<Utc>) -> Result<u64, AppError> {
        match self {
            MaintenanceJob::RescorePosts => store.rescore_all_posts().await,
            MaintenanceJob::ArchiveStories => store.archive_expired_stories(now).await,
            MaintenanceJob::PurgeLogs => store.purge_logs(retention_cutoff(now)).await,
        }
    }
}

fn spawn_job(job: MaintenanceJob, store: SharedStore) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(job.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let start = Instant::now();

            match job.run_once(store.as_ref(), Utc::now()).await {
                Ok(affected) => info!(
                    job = job.name(),
                    affected,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Maintenance job finished"
                ),
                Err(e) => error!(job = job.name(), error = %e, "Maintenance job failed"),
            }
        }
    })
}

/// Starts every maintenance job in the background.
pub fn spawn_maintenance(store: SharedStore) -> Vec<JoinHandle<()>> {
    MaintenanceJob::ALL
        .into_iter()
        .map(|job| {
            info!(job = job.name(), period_secs = job.period().as_secs(), "Scheduling job");
            spawn_job(job, store.clone())
        })
        .collect()
}
