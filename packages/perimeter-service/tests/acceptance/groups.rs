use perimeter_domain::RetrievalScope;
use perimeter_service::{PropagationOutcome, ResolveRequest, ResolvedContext, ServiceError};

use super::{Harness, perimeter};

#[tokio::test]
async fn sharing_with_a_group_records_membership() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha").await;

	harness.service.create_group("group7", "Research", "owner1").await.expect("Create group.");
	harness.service.share(doc_id, "group7").await.expect("Share must succeed.");

	assert_eq!(harness.memory.documents.members("group7"), vec![doc_id]);

	harness.service.unshare(doc_id, "group7").await.expect("Unshare must succeed.");

	assert!(harness.memory.documents.members("group7").is_empty());
}

#[tokio::test]
async fn duplicate_groups_are_rejected() {
	let harness = Harness::new();

	harness.service.create_group("group7", "Research", "owner1").await.expect("Create group.");

	let err = harness
		.service
		.create_group("/group7/", "Again", "owner1")
		.await
		.expect_err("Group ids are unique.");

	assert!(matches!(err, ServiceError::Conflict { .. }));
}

#[tokio::test]
async fn deleting_a_group_unshares_every_member() {
	let harness = Harness::new();
	let first = harness.upload("owner1", "alpha beta").await;
	let second = harness.upload("owner2", "alpha gamma").await;

	harness.service.create_group("group7", "Research", "owner1").await.expect("Create group.");

	for doc_id in [first, second] {
		harness.service.share(doc_id, "group7").await.expect("Share must succeed.");
	}

	let deletion = harness.service.delete_group("group7").await.expect("Delete group.");

	assert_eq!(deletion.documents.len(), 2);
	assert!(
		deletion
			.documents
			.iter()
			.all(|(_, outcome)| matches!(outcome, PropagationOutcome::Indexed { .. }))
	);
	assert_eq!(deletion.documents[0].1.perimeter(), &perimeter("owner1"));
	assert_eq!(deletion.documents[1].1.perimeter(), &perimeter("owner2"));

	for doc_id in [first, second] {
		harness.assert_stamped(doc_id).await;
	}

	let resolved = harness
		.service
		.resolve(ResolveRequest::new(RetrievalScope::Perimeter("group7".to_string()), "alpha"))
		.await
		.expect("Resolve must succeed.");

	assert!(matches!(resolved, ResolvedContext::Empty));
	assert!(matches!(
		harness.service.delete_group("group7").await,
		Err(ServiceError::NotFound { .. })
	));
}

#[tokio::test]
async fn deleted_members_are_skipped() {
	let harness = Harness::new();
	let kept = harness.upload("owner1", "alpha").await;
	let gone = harness.upload("owner1", "beta").await;

	harness.service.create_group("group7", "Research", "owner1").await.expect("Create group.");
	harness.service.share(kept, "group7").await.expect("Share must succeed.");
	harness.service.share(gone, "group7").await.expect("Share must succeed.");
	harness.service.delete_document(gone).await.expect("Delete must succeed.");

	let deletion = harness.service.delete_group("group7").await.expect("Delete group.");

	assert_eq!(
		deletion.documents.iter().map(|(doc_id, _)| *doc_id).collect::<Vec<_>>(),
		vec![kept]
	);
}

#[tokio::test]
async fn deleting_a_group_revokes_tokens_shared_before_it_existed() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha beta").await;

	harness.service.share(doc_id, "team").await.expect("Share must succeed.");
	harness.service.create_group("team", "Team", "owner1").await.expect("Create group.");

	let deletion = harness.service.delete_group("team").await.expect("Delete group.");

	assert_eq!(
		deletion.documents.iter().map(|(doc_id, _)| *doc_id).collect::<Vec<_>>(),
		vec![doc_id]
	);

	harness.assert_stamped(doc_id).await;

	let resolved = harness
		.service
		.resolve(ResolveRequest::new(RetrievalScope::Perimeter("team".to_string()), "alpha"))
		.await
		.expect("Resolve must succeed.");

	assert!(matches!(resolved, ResolvedContext::Empty));
}
