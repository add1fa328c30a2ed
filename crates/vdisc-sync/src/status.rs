use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use vdisc_catalogue::{find_job_record_id, Catalogue, SCHEDULED_JOBS_TABLE};
use vdisc_core::{JobResult, JobRunUpdate};

/// Persists a run's terminal status on its scheduled-job record.
pub struct JobStatusReporter {
    catalogue: Arc<dyn Catalogue>,
    job_name: String,
}

impl JobStatusReporter {
    pub fn new(catalogue: Arc<dyn Catalogue>, job_name: impl Into<String>) -> Self {
        Self {
            catalogue,
            job_name: job_name.into(),
        }
    }

    /// Returns whether the record was updated. A missing record or failed
    /// write is logged and reported as `false`; it never changes `result`.
    pub async fn report(&self, result: JobResult, error_details: Vec<String>) -> bool {
        let update = JobRunUpdate::new(result, error_details, Utc::now());

        let job_id = match find_job_record_id(self.catalogue.as_ref(), &self.job_name).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                error!("job {} not found in service catalogue", self.job_name);
                return false;
            }
            Err(err) => {
                error!("unable to look up job {} in service catalogue: {err}", self.job_name);
                return false;
            }
        };

        let data = match serde_json::to_value(&update) {
            Ok(data) => data,
            Err(err) => {
                error!("unable to serialize status for job {}: {err}", self.job_name);
                return false;
            }
        };

        match self.catalogue.update(SCHEDULED_JOBS_TABLE, &job_id, &data).await {
            Ok(()) => {
                info!(job = %self.job_name, %result, "recorded job status");
                true
            }
            Err(err) => {
                error!("unable to update status for job {}: {err}", self.job_name);
                false
            }
        }
    }
}
