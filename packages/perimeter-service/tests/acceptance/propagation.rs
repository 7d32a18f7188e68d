use perimeter_domain::{DocumentStatus, RetrievalScope};
use perimeter_service::{PropagationOutcome, ResolveRequest, ResolvedContext, ServiceError};

use super::{Harness, perimeter, words};

#[tokio::test]
async fn upload_indexes_under_owner_perimeter() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", &words("w", 20)).await;
	let chunks = harness.chunks(doc_id);

	assert_eq!(chunks.len(), 3);
	assert_eq!(chunks.iter().map(|chunk| chunk.chunk_index).collect::<Vec<_>>(), vec![0, 1, 2]);
	assert!(chunks.iter().all(|chunk| chunk.perimeter.to_string() == "/owner1/"));
	assert_eq!(harness.memory.documents.status(doc_id), Some(DocumentStatus::Completed));
}

#[tokio::test]
async fn share_then_unshare_moves_visibility() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha beta gamma").await;
	let shared = harness.service.share(doc_id, "group7").await.expect("Share must succeed.");

	assert!(matches!(shared, PropagationOutcome::Indexed { chunk_count: 1, .. }));
	assert_eq!(shared.perimeter().to_string(), "/owner1/ /group7/");
	harness.assert_stamped(doc_id).await;

	let found = harness
		.service
		.resolve(ResolveRequest::new(RetrievalScope::Perimeter("group7".to_string()), "alpha"))
		.await
		.expect("Resolve must succeed.");
	let ResolvedContext::Chunks { chunks } = found else {
		panic!("Expected similarity chunks, got {found:?}.");
	};

	assert!(chunks.iter().all(|scored| scored.chunk.doc_id == doc_id));

	harness.service.share(doc_id, "group8").await.expect("Share must succeed.");

	let unshared = harness.service.unshare(doc_id, "group7").await.expect("Unshare must succeed.");

	assert_eq!(unshared.perimeter(), &perimeter("owner1 group8"));
	harness.assert_stamped(doc_id).await;

	let revoked = harness
		.service
		.resolve(ResolveRequest::new(RetrievalScope::Perimeter("group7".to_string()), "alpha"))
		.await
		.expect("Resolve must succeed.");

	assert!(matches!(revoked, ResolvedContext::Empty));

	let either = harness
		.service
		.resolve(ResolveRequest::new(
			RetrievalScope::Perimeter("group7 group8".to_string()),
			"alpha",
		))
		.await
		.expect("Resolve must succeed.");

	assert!(matches!(either, ResolvedContext::Chunks { chunks } if chunks.len() == 1));
}

#[tokio::test]
async fn repeated_share_does_not_reembed() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", &words("w", 12)).await;

	harness.service.share(doc_id, "group7").await.expect("Share must succeed.");

	let calls = harness.embedding.calls();
	let chunk_ids = harness.chunks(doc_id).into_iter().map(|c| c.chunk_id).collect::<Vec<_>>();
	let again = harness.service.share(doc_id, "/group7/").await.expect("Share must succeed.");

	assert!(matches!(again, PropagationOutcome::Unchanged { .. }));
	assert_eq!(harness.embedding.calls(), calls);
	assert_eq!(
		harness.chunks(doc_id).into_iter().map(|c| c.chunk_id).collect::<Vec<_>>(),
		chunk_ids
	);
}

#[tokio::test]
async fn unsharing_an_absent_token_is_a_no_op() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha beta").await;
	let calls = harness.embedding.calls();
	let outcome = harness.service.unshare(doc_id, "group9").await.expect("Unshare must succeed.");

	assert_eq!(outcome, PropagationOutcome::Unchanged { perimeter: perimeter("owner1") });
	assert_eq!(harness.embedding.calls(), calls);
}

#[tokio::test]
async fn owner_token_cannot_be_unshared() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha beta").await;
	let err = harness.service.unshare(doc_id, "owner1").await.expect_err("Owner must stay.");

	assert!(matches!(err, ServiceError::InvalidRequest { .. }));
}

#[tokio::test]
async fn share_rejects_blank_tokens_and_unknown_documents() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha").await;

	assert!(matches!(
		harness.service.share(doc_id, "  ").await,
		Err(ServiceError::InvalidRequest { .. })
	));
	assert!(matches!(
		harness.service.share(uuid::Uuid::new_v4(), "group7").await,
		Err(ServiceError::NotFound { .. })
	));
}

#[tokio::test]
async fn reindexing_twice_leaves_one_copy_of_each_chunk() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", &words("w", 20)).await;
	let target = perimeter("owner1 group7");
	let first = harness.service.index(doc_id, "owner1", &target, &words("w", 20)).await;
	let second = harness.service.index(doc_id, "owner1", &target, &words("w", 20)).await;

	assert_eq!(first.expect("Index must succeed."), 3);
	assert_eq!(second.expect("Index must succeed."), 3);
	assert_eq!(harness.memory.chunks.len(), 3);
	assert!(harness.chunks(doc_id).iter().all(|chunk| chunk.perimeter == target));
}

#[tokio::test]
async fn explicit_reindex_always_rebuilds() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha beta").await;
	let calls = harness.embedding.calls();
	let outcome =
		harness.service.reindex(doc_id, perimeter("owner1")).await.expect("Reindex must succeed.");

	assert!(matches!(outcome, PropagationOutcome::Indexed { chunk_count: 1, .. }));
	assert_eq!(harness.embedding.calls(), calls + 1);
	assert!(matches!(
		harness.service.reindex(doc_id, perimeter("")).await,
		Err(ServiceError::InvalidRequest { .. })
	));
}

#[tokio::test]
async fn rate_limited_share_defers_and_hides_stale_chunks() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha beta gamma").await;

	harness.service.share(doc_id, "group7").await.expect("Share must succeed.");
	harness.embedding.rate_limit_next(1);

	let outcome = harness.service.unshare(doc_id, "group7").await.expect("Unshare is accepted.");
	let PropagationOutcome::Processing { job_id, .. } = outcome else {
		panic!("Expected a processing acknowledgment, got {outcome:?}.");
	};

	assert_eq!(harness.memory.documents.status(doc_id), Some(DocumentStatus::InProgress));
	assert!(harness.chunks(doc_id).is_empty());

	let job = harness.service.get_job(job_id).await.expect("Job lookup.").expect("Job exists.");

	assert_eq!(job.attempts, 1);
	assert_eq!(job.perimeter, perimeter("owner1"));
}

#[tokio::test]
async fn delete_document_removes_chunks() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", &words("w", 20)).await;
	let removed = harness.service.delete_document(doc_id).await.expect("Delete must succeed.");

	assert_eq!(removed, 3);
	assert!(harness.memory.chunks.is_empty());
	assert_eq!(harness.memory.documents.status(doc_id), None);
	assert_eq!(harness.service.delete_by_document(doc_id).await.expect("No-op delete."), 0);
}
