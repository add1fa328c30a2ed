use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use vdisc_core::RunSummary;

use crate::DiscoveryPipeline;

/// Receives every finished run in service mode.
pub type RunObserver = Arc<dyn Fn(RunSummary) + Send + Sync>;

/// Runs the pipeline and hands the summary to `observer`, skipping the call
/// when a previous run still holds `guard`.
pub async fn run_guarded(pipeline: &DiscoveryPipeline, guard: &Mutex<()>, observer: &RunObserver) -> bool {
    let Ok(_running) = guard.try_lock() else {
        warn!("previous discovery run still in progress; skipping this tick");
        return false;
    };
    let summary = pipeline.run_once().await;
    info!(
        run_id = %summary.run_id,
        result = %summary.result,
        components = summary.components,
        "discovery run finished"
    );
    observer(summary);
    true
}

/// Builds (but does not start) a scheduler that re-runs the pipeline every `every`.
pub async fn build_interval_scheduler(
    pipeline: Arc<DiscoveryPipeline>,
    guard: Arc<Mutex<()>>,
    every: Duration,
    observer: RunObserver,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_repeated_async(every, move |_uuid, _l| {
        let pipeline = pipeline.clone();
        let guard = guard.clone();
        let observer = observer.clone();
        Box::pin(async move {
            run_guarded(&pipeline, &guard, &observer).await;
        })
    })
    .with_context(|| format!("creating interval job every {}s", every.as_secs()))?;
    sched.add(job).await.context("adding interval job")?;
    Ok(sched)
}
