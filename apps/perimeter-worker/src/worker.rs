use std::time::Duration;

use time::OffsetDateTime;
use tokio::time as tokio_time;

use perimeter_domain::{JobStatus, JobType};
use perimeter_service::{JobExecution, PerimeterService, jobs::sanitize_job_error};

use crate::Result;

pub async fn run_worker(service: &PerimeterService) -> Result<()> {
	let poll = Duration::from_millis(service.cfg.worker.poll_interval_ms);

	tracing::info!(poll_interval_ms = service.cfg.worker.poll_interval_ms, "Worker started.");

	loop {
		match process_jobs_once(service).await {
			Ok(0) => tokio_time::sleep(poll).await,
			Ok(processed) => tracing::debug!(processed, "Processed jobs."),
			Err(err) => {
				tracing::error!(error = %err, "Job polling failed.");

				tokio_time::sleep(poll).await;
			},
		}
	}
}

/// Runs every job that is due right now, oldest first within each job type. Returns how many
/// jobs this worker ran, whatever their outcome.
pub async fn process_jobs_once(service: &PerimeterService) -> Result<usize> {
	let now = OffsetDateTime::now_utc();
	let mut processed = 0;

	for job_type in JobType::ALL {
		let jobs = service.list_jobs(job_type, JobStatus::Requested).await?;

		for job in jobs.iter().filter(|job| job.is_available(now)) {
			match service.run_job(job).await {
				Ok(None) => continue,
				Ok(Some(JobExecution::Completed { chunk_count })) => {
					tracing::info!(job_id = %job.job_id, chunk_count, "Job completed.");
				},
				Ok(Some(JobExecution::Deferred { next_job_id })) => {
					tracing::info!(job_id = %job.job_id, %next_job_id, "Job deferred.");
				},
				Err(err) => {
					tracing::warn!(
						job_id = %job.job_id,
						error = %sanitize_job_error(&err.to_string()),
						"Job ended in failure."
					);
				},
			}

			processed += 1;
		}
	}

	Ok(processed)
}
