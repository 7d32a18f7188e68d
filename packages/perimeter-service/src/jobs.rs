use serde::Serialize;
use time::Duration;
use uuid::Uuid;

use crate::{
	PerimeterService, PropagationOutcome, ServiceError, ServiceResult, backends::missing_document,
	now,
};
use perimeter_config::Worker;
use perimeter_domain::{DocumentStatus, Job, JobStatus, JobType, Perimeter};

const MAX_JOB_ERROR_CHARS: usize = 1_024;
const REDACTED: &str = "[REDACTED]";
const SECRET_KEYS: [&str; 5] = ["api_key", "apikey", "password", "secret", "token"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobExecution {
	Completed { chunk_count: usize },
	/// Rate limited again or the document was busy; the work continues as `next_job_id`.
	Deferred { next_job_id: Uuid },
}

impl PerimeterService {
	/// Records a share propagation to run later under `perimeter`. The document is marked
	/// `IN_PROGRESS` until a worker finishes the job.
	pub async fn enqueue_reindex(&self, doc_id: Uuid, perimeter: Perimeter) -> ServiceResult<Uuid> {
		if perimeter.is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "Perimeter must contain at least one token.".to_string(),
			});
		}

		self.require_document(doc_id).await?;

		let now = now();
		let job = Job::new(doc_id, perimeter, JobType::SharePropagate, now);

		self.backends.jobs.save(&job).await?;
		self.backends.documents.set_status(doc_id, DocumentStatus::InProgress, now).await?;

		tracing::info!(
			%doc_id,
			job_id = %job.job_id,
			perimeter = %job.perimeter,
			"Queued reindex job."
		);

		Ok(job.job_id)
	}

	pub async fn list_jobs(&self, job_type: JobType, status: JobStatus) -> ServiceResult<Vec<Job>> {
		self.backends.jobs.list(job_type, status).await
	}

	pub async fn get_job(&self, job_id: Uuid) -> ServiceResult<Option<Job>> {
		self.backends.jobs.get(job_id).await
	}

	/// Moves a `REQUESTED` job to `IN_PROGRESS`. Exactly one concurrent caller gets `true`.
	pub async fn claim_job(&self, job_id: Uuid) -> ServiceResult<bool> {
		self.backends
			.jobs
			.update_status(job_id, JobStatus::Requested, JobStatus::InProgress, None, now())
			.await
	}

	pub async fn complete_job(&self, job_id: Uuid) -> ServiceResult<()> {
		self.finish_job(job_id, JobStatus::Completed, None).await
	}

	pub async fn fail_job(&self, job_id: Uuid, error: &str) -> ServiceResult<()> {
		self.finish_job(job_id, JobStatus::Failed, Some(&sanitize_job_error(error))).await
	}

	/// Runs a claimed job under the document lock. Re-embed jobs use the document's current
	/// perimeter; share propagation applies the perimeter recorded on the job.
	pub async fn execute_job(&self, job: &Job) -> ServiceResult<JobExecution> {
		let guard = self.lock_document(job.doc_id).await?;
		let result = self.execute_job_locked(job).await;

		guard.release().await;

		result
	}

	/// Claims, executes, and settles one job. Returns `None` when another worker claimed it
	/// first.
	pub async fn run_job(&self, job: &Job) -> ServiceResult<Option<JobExecution>> {
		if !self.claim_job(job.job_id).await? {
			tracing::debug!(job_id = %job.job_id, "Job was claimed by another worker.");

			return Ok(None);
		}

		match self.execute_job(job).await {
			Ok(execution) => {
				match &execution {
					JobExecution::Completed { .. } => self.complete_job(job.job_id).await?,
					JobExecution::Deferred { next_job_id } => {
						let note = format!("Rate limited. Continued as job {next_job_id}.");

						self.fail_job(job.job_id, &note).await?;
					},
				}

				Ok(Some(execution))
			},
			Err(ServiceError::ConcurrencyConflict { message }) => {
				let next_job_id = self.requeue(job).await?;

				self.fail_job(job.job_id, &format!("{message} Continued as job {next_job_id}."))
					.await?;

				Ok(Some(JobExecution::Deferred { next_job_id }))
			},
			Err(err) => {
				tracing::error!(error = %err, job_id = %job.job_id, "Job failed.");

				self.fail_job(job.job_id, &err.to_string()).await?;

				Err(err)
			},
		}
	}

	async fn execute_job_locked(&self, job: &Job) -> ServiceResult<JobExecution> {
		let doc = self.require_document(job.doc_id).await?;
		let perimeter = match job.job_type {
			JobType::ReEmbed => self
				.backends
				.documents
				.get_perimeter(job.doc_id)
				.await?
				.ok_or_else(|| missing_document(job.doc_id))?,
			JobType::SharePropagate => job.perimeter.clone(),
		};

		tracing::info!(
			job_id = %job.job_id,
			doc_id = %job.doc_id,
			job_type = job.job_type.as_str(),
			attempts = job.attempts,
			"Executing job."
		);

		match self.reindex_locked(&doc, perimeter, job.attempts).await? {
			PropagationOutcome::Indexed { chunk_count, .. } =>
				Ok(JobExecution::Completed { chunk_count }),
			PropagationOutcome::Processing { job_id, .. } =>
				Ok(JobExecution::Deferred { next_job_id: job_id }),
			PropagationOutcome::Unchanged { .. } => Ok(JobExecution::Completed { chunk_count: 0 }),
		}
	}

	/// Copies a job whose document was busy into a fresh `REQUESTED` job.
	async fn requeue(&self, job: &Job) -> ServiceResult<Uuid> {
		let now = now();
		let mut next = Job::new(job.doc_id, job.perimeter.clone(), job.job_type, now);

		next.attempts = job.attempts;
		next.available_at = now + retry_delay(&self.cfg.worker, job.attempts.max(1), None);

		self.backends.jobs.save(&next).await?;

		tracing::info!(
			job_id = %job.job_id,
			next_job_id = %next.job_id,
			"Document was locked. Requeued job."
		);

		Ok(next.job_id)
	}

	async fn finish_job(
		&self,
		job_id: Uuid,
		to: JobStatus,
		last_error: Option<&str>,
	) -> ServiceResult<()> {
		let moved = self
			.backends
			.jobs
			.update_status(job_id, JobStatus::InProgress, to, last_error, now())
			.await?;

		if !moved {
			return Err(ServiceError::Conflict {
				message: format!("Job {job_id} is not in progress."),
			});
		}

		Ok(())
	}
}

/// Exponential backoff from `base_backoff_ms`, capped at `max_backoff_ms`. A provider
/// `Retry-After` hint wins when it asks for a longer pause.
pub fn retry_delay(cfg: &Worker, attempts: i32, retry_after_ms: Option<u64>) -> Duration {
	let exponent = attempts.saturating_sub(1).clamp(0, 16) as u32;
	let backoff = cfg.base_backoff_ms.saturating_mul(1_u64 << exponent).min(cfg.max_backoff_ms);
	let delay = backoff.max(retry_after_ms.unwrap_or(0));

	Duration::milliseconds(delay.min(i64::MAX as u64) as i64)
}

/// Redacts credentials that provider errors tend to echo back, then caps the length.
pub fn sanitize_job_error(error: &str) -> String {
	let mut words = Vec::new();
	let mut after_bearer = false;

	for raw in error.split_whitespace() {
		if after_bearer {
			words.push(REDACTED.to_string());

			after_bearer = false;

			continue;
		}

		after_bearer = raw.eq_ignore_ascii_case("bearer");

		words.push(redact_assignment(raw).unwrap_or_else(|| raw.to_string()));
	}

	let joined = words.join(" ");

	if joined.chars().count() <= MAX_JOB_ERROR_CHARS {
		return joined;
	}

	joined.chars().take(MAX_JOB_ERROR_CHARS).collect()
}

fn redact_assignment(word: &str) -> Option<String> {
	let split = word.find(['=', ':'])?;
	let key = word[..split].to_ascii_lowercase();

	SECRET_KEYS
		.iter()
		.any(|secret| key.contains(secret))
		.then(|| format!("{}{REDACTED}", &word[..=split]))
}
