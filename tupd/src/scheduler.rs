//! Cron-driven triggers.
//!
//! Each tick calls [`TenantsUpdater::update_all_tenants`]. Overlapping ticks
//! are harmless: the run-state lock lets only one of them start a run.

use crate::updater::{TenantsUpdater, TriggerOutcome};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{info, warn};

/// Register the trigger on `schedule` and start ticking.
pub async fn start(updater: TenantsUpdater, schedule: &str) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_id, _scheduler| {
        let updater = updater.clone();
        Box::pin(async move {
            let outcome = updater.update_all_tenants().await;
            log_outcome(&outcome);
        })
    })?;
    scheduler.add(job).await?;
    scheduler.start().await?;

    info!(schedule, "update schedule registered");
    Ok(scheduler)
}

pub fn log_outcome(outcome: &TriggerOutcome) {
    match outcome {
        TriggerOutcome::Failed(reason) => warn!(%reason, "update trigger failed"),
        other => info!(outcome = ?other, "update trigger done"),
    }
}
