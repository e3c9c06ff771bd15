use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::pipeline::{RunTrigger, SyncPipeline};

/// Cron job that runs the pipeline with [`RunTrigger::Scheduled`]. Returns
/// `None` when scheduling is disabled in the config.
pub async fn maybe_build_scheduler(pipeline: Arc<SyncPipeline>) -> Result<Option<JobScheduler>> {
    if !pipeline.config().scheduler_enabled {
        return Ok(None);
    }

    let cron = pipeline.config().sync_cron.clone();
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);
        Box::pin(async move {
            match pipeline.run_once(RunTrigger::Scheduled).await {
                Ok(summary) => info!(
                    run_id = %summary.run_id,
                    normalized_inserted = summary.normalized_inserted,
                    failures = summary.failures.len(),
                    "scheduled sync finished"
                ),
                Err(err) => error!(error = %format!("{err:#}"), "scheduled sync failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    info!(%cron, "sync scheduler configured");
    Ok(Some(sched))
}
