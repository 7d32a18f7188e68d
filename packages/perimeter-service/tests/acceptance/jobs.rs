use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use perimeter_domain::{DocumentStatus, Job, JobStatus, JobType};
use perimeter_service::{
	BoxFuture, JobExecution, JobStore, PerimeterService, PropagationOutcome, Providers,
	ServiceError, ServiceResult,
};

use super::{Harness, perimeter};

/// Job store that refuses every write, as a database outage would.
struct RejectingJobs;
impl JobStore for RejectingJobs {
	fn save<'a>(&'a self, _job: &'a Job) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async {
			Err(ServiceError::Storage { message: "Jobs table is unavailable.".to_string() })
		})
	}

	fn get<'a>(&'a self, _job_id: Uuid) -> BoxFuture<'a, ServiceResult<Option<Job>>> {
		Box::pin(async { Ok(None) })
	}

	fn update_status<'a>(
		&'a self,
		_job_id: Uuid,
		_from: JobStatus,
		_to: JobStatus,
		_last_error: Option<&'a str>,
		_now: OffsetDateTime,
	) -> BoxFuture<'a, ServiceResult<bool>> {
		Box::pin(async { Ok(false) })
	}

	fn list<'a>(
		&'a self,
		_job_type: JobType,
		_status: JobStatus,
	) -> BoxFuture<'a, ServiceResult<Vec<Job>>> {
		Box::pin(async { Ok(Vec::new()) })
	}
}

#[tokio::test]
async fn deferred_reindex_completes_through_the_worker_path() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha beta gamma").await;

	harness.embedding.rate_limit_next(1);

	let outcome = harness.service.share(doc_id, "group7").await.expect("Share is accepted.");
	let PropagationOutcome::Processing { job_id, .. } = outcome else {
		panic!("Expected a processing acknowledgment, got {outcome:?}.");
	};
	let pending = harness
		.service
		.list_jobs(JobType::ReEmbed, JobStatus::Requested)
		.await
		.expect("List jobs.");

	assert_eq!(pending.len(), 1);
	assert_eq!(pending[0].job_id, job_id);

	let execution = harness.service.run_job(&pending[0]).await.expect("Job must run.");

	assert!(matches!(execution, Some(JobExecution::Completed { chunk_count: 1 })));

	let job = harness.service.get_job(job_id).await.expect("Job lookup.").expect("Job exists.");

	assert_eq!(job.status, JobStatus::Completed);
	assert_eq!(harness.memory.documents.status(doc_id), Some(DocumentStatus::Completed));
	assert!(
		harness.chunks(doc_id).iter().all(|chunk| chunk.perimeter == perimeter("owner1 group7"))
	);
}

#[tokio::test]
async fn persistent_rate_limits_eventually_fail_the_document() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha beta").await;

	harness.embedding.rate_limit_next(usize::MAX);

	let outcome = harness.service.share(doc_id, "group7").await.expect("Share is accepted.");

	assert!(outcome.is_processing());

	let first = harness.memory.jobs.all().remove(0);
	let execution = harness.service.run_job(&first).await.expect("Job must run.");
	let Some(JobExecution::Deferred { next_job_id }) = execution else {
		panic!("Expected a deferred execution, got {execution:?}.");
	};
	let first = harness.service.get_job(first.job_id).await.expect("Lookup.").expect("Exists.");
	let second = harness.service.get_job(next_job_id).await.expect("Lookup.").expect("Exists.");

	assert_eq!(first.status, JobStatus::Failed);
	assert_eq!(second.status, JobStatus::Requested);
	assert_eq!(second.attempts, 2);

	let err = harness.service.run_job(&second).await.expect_err("Attempts are exhausted.");

	assert!(matches!(err, ServiceError::RateLimited { .. }));
	assert_eq!(harness.memory.documents.status(doc_id), Some(DocumentStatus::Failed));

	let second = harness.service.get_job(next_job_id).await.expect("Lookup.").expect("Exists.");

	assert_eq!(second.status, JobStatus::Failed);
	assert!(second.last_error.is_some());
}

#[tokio::test]
async fn only_one_claimer_wins() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha").await;
	let job_id = harness
		.service
		.enqueue_reindex(doc_id, perimeter("owner1 group3"))
		.await
		.expect("Enqueue must succeed.");

	assert_eq!(harness.memory.documents.status(doc_id), Some(DocumentStatus::InProgress));
	assert!(harness.service.claim_job(job_id).await.expect("Claim."));
	assert!(!harness.service.claim_job(job_id).await.expect("Claim."));
}

#[tokio::test]
async fn share_propagation_applies_the_job_perimeter() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha beta").await;
	let job_id = harness
		.service
		.enqueue_reindex(doc_id, perimeter("owner1 group3"))
		.await
		.expect("Enqueue must succeed.");
	let job = harness.service.get_job(job_id).await.expect("Lookup.").expect("Exists.");

	assert_eq!(job.job_type, JobType::SharePropagate);

	let execution = harness.service.run_job(&job).await.expect("Job must run.");

	assert!(matches!(execution, Some(JobExecution::Completed { .. })));
	assert!(
		harness.chunks(doc_id).iter().all(|chunk| chunk.perimeter == perimeter("owner1 group3"))
	);
	assert!(harness.service.run_job(&job).await.expect("Second run is a no-op.").is_none());
}

#[tokio::test]
async fn finished_jobs_cannot_be_finished_again() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha").await;
	let job_id = harness
		.service
		.enqueue_reindex(doc_id, perimeter("owner1"))
		.await
		.expect("Enqueue must succeed.");

	assert!(matches!(
		harness.service.complete_job(job_id).await,
		Err(ServiceError::Conflict { .. })
	));
	assert!(harness.service.claim_job(job_id).await.expect("Claim."));

	harness.service.fail_job(job_id, "worker stopped").await.expect("Fail must succeed.");

	assert!(matches!(
		harness.service.complete_job(job_id).await,
		Err(ServiceError::Conflict { .. })
	));
}

#[tokio::test]
async fn jobs_for_deleted_documents_fail() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha").await;
	let job_id = harness
		.service
		.enqueue_reindex(doc_id, perimeter("owner1"))
		.await
		.expect("Enqueue must succeed.");
	let job = harness.service.get_job(job_id).await.expect("Lookup.").expect("Exists.");

	harness.service.delete_document(doc_id).await.expect("Delete must succeed.");

	let err = harness.service.run_job(&job).await.expect_err("Document is gone.");

	assert!(matches!(err, ServiceError::NotFound { .. }));

	let job = harness.service.get_job(job_id).await.expect("Lookup.").expect("Exists.");

	assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn first_rate_limit_always_leaves_a_job() {
	let mut cfg = perimeter_testkit::test_config();

	cfg.worker.max_attempts = 1;

	let harness = Harness::with_config(cfg);
	let doc_id = harness.upload("owner1", "alpha beta").await;

	harness.embedding.rate_limit_next(1);

	let outcome = harness.service.share(doc_id, "group7").await.expect("Share is accepted.");

	assert!(outcome.is_processing());
	assert_eq!(harness.memory.jobs.all().len(), 1);
	assert_eq!(harness.memory.documents.status(doc_id), Some(DocumentStatus::InProgress));

	let job = harness.memory.jobs.all().remove(0);
	let execution = harness.service.run_job(&job).await.expect("Job must run.");

	assert!(matches!(execution, Some(JobExecution::Completed { .. })));
	assert_eq!(harness.memory.documents.status(doc_id), Some(DocumentStatus::Completed));
}

#[tokio::test]
async fn unsaved_deferral_fails_the_document() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha beta").await;
	let mut backends = harness.memory.backends();

	backends.jobs = Arc::new(RejectingJobs);

	let service = PerimeterService::with_providers(
		perimeter_testkit::test_config(),
		backends,
		Providers::new(perimeter_testkit::word_tokenizer())
			.with_embedding(harness.embedding.clone()),
	);

	harness.embedding.rate_limit_next(1);

	let err = service.share(doc_id, "group7").await.expect_err("The job cannot be stored.");

	assert!(matches!(err, ServiceError::Storage { .. }));
	assert_eq!(harness.memory.documents.status(doc_id), Some(DocumentStatus::Failed));
	assert!(harness.chunks(doc_id).is_empty());
}
