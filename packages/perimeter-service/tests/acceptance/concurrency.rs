use std::time::Duration;

use perimeter_domain::JobStatus;
use perimeter_service::{DocumentLocks, JobExecution, ServiceError};

use super::{Harness, perimeter};

#[tokio::test]
async fn concurrent_shares_on_one_document_both_land() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha beta gamma").await;
	let (left, right) = tokio::join!(
		harness.service.share(doc_id, "group1"),
		harness.service.share(doc_id, "group2"),
	);

	left.expect("First share must succeed.");
	right.expect("Second share must succeed.");

	let doc = harness
		.service
		.backends
		.documents
		.get_document(doc_id)
		.await
		.expect("Lookup.")
		.expect("Document exists.");

	assert_eq!(doc.perimeter, perimeter("owner1 group1 group2"));
	harness.assert_stamped(doc_id).await;
}

#[tokio::test]
async fn held_lock_surfaces_a_conflict() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha").await;
	let guard =
		harness.memory.locks.acquire(doc_id, Duration::from_millis(10)).await.expect("Lock.");
	let err = harness.service.share(doc_id, "group7").await.expect_err("Writer is blocked.");

	assert!(matches!(err, ServiceError::ConcurrencyConflict { .. }));

	guard.release().await;

	assert!(harness.service.share(doc_id, "group7").await.is_ok());
}

#[tokio::test]
async fn writers_on_different_documents_proceed_together() {
	let harness = Harness::new();
	let first = harness.upload("owner1", "alpha").await;
	let second = harness.upload("owner1", "beta").await;
	let guard =
		harness.memory.locks.acquire(first, Duration::from_millis(10)).await.expect("Lock.");

	assert!(harness.service.share(second, "group7").await.is_ok());

	guard.release().await;
}

#[tokio::test]
async fn busy_document_requeues_the_job() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha").await;
	let job_id = harness
		.service
		.enqueue_reindex(doc_id, perimeter("owner1 group7"))
		.await
		.expect("Enqueue must succeed.");
	let job = harness.service.get_job(job_id).await.expect("Lookup.").expect("Exists.");
	let guard =
		harness.memory.locks.acquire(doc_id, Duration::from_millis(10)).await.expect("Lock.");
	let execution = harness.service.run_job(&job).await.expect("Busy jobs are requeued.");
	let Some(JobExecution::Deferred { next_job_id }) = execution else {
		panic!("Expected a requeued job, got {execution:?}.");
	};

	guard.release().await;

	let next = harness.service.get_job(next_job_id).await.expect("Lookup.").expect("Exists.");

	assert_eq!(next.status, JobStatus::Requested);
	assert_eq!(next.perimeter, perimeter("owner1 group7"));
	assert!(matches!(
		harness.service.run_job(&next).await,
		Ok(Some(JobExecution::Completed { .. }))
	));
}
