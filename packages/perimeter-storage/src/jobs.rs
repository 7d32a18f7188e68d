use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use perimeter_domain::{Job, JobStatus, JobType};

use crate::{Result, models::JobRow};

pub async fn insert_job<'e, E>(executor: E, job: &Job) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO jobs (
\tjob_id,
\tdoc_id,
\tperimeter,
\tjob_type,
\tstatus,
\tattempts,
\tlast_error,
\tavailable_at,
\tcreated_at,
\tupdated_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
	)
	.bind(job.job_id)
	.bind(job.doc_id)
	.bind(job.perimeter.to_string())
	.bind(job.job_type.as_str())
	.bind(job.status.as_str())
	.bind(job.attempts)
	.bind(job.last_error.as_deref())
	.bind(job.available_at)
	.bind(job.created_at)
	.bind(job.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn fetch_job<'e, E>(executor: E, job_id: Uuid) -> Result<Option<Job>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, JobRow>(
		"\
SELECT
\tjob_id,
\tdoc_id,
\tperimeter,
\tjob_type,
\tstatus,
\tattempts,
\tlast_error,
\tavailable_at,
\tcreated_at,
\tupdated_at
FROM jobs
WHERE job_id = $1",
	)
	.bind(job_id)
	.fetch_optional(executor)
	.await?;

	row.map(Job::try_from).transpose()
}

/// The only polling shape: one `(type, status)` pair, oldest first.
pub async fn list_jobs<'e, E>(executor: E, job_type: JobType, status: JobStatus) -> Result<Vec<Job>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, JobRow>(
		"\
SELECT
\tjob_id,
\tdoc_id,
\tperimeter,
\tjob_type,
\tstatus,
\tattempts,
\tlast_error,
\tavailable_at,
\tcreated_at,
\tupdated_at
FROM jobs
WHERE job_type = $1 AND status = $2
ORDER BY created_at ASC, job_id ASC",
	)
	.bind(job_type.as_str())
	.bind(status.as_str())
	.fetch_all(executor)
	.await?;

	rows.into_iter().map(Job::try_from).collect()
}

/// Moves a job from `from` to `to`. Returns `false` when the job is missing or no longer in
/// `from`, which is how concurrent claimers lose the race.
pub async fn update_job_status<'e, E>(
	executor: E,
	job_id: Uuid,
	from: JobStatus,
	to: JobStatus,
	last_error: Option<&str>,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE jobs
SET status = $1,
\tlast_error = COALESCE($2, last_error),
\tupdated_at = $3
WHERE job_id = $4 AND status = $5",
	)
	.bind(to.as_str())
	.bind(last_error)
	.bind(now)
	.bind(job_id)
	.bind(from.as_str())
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}
