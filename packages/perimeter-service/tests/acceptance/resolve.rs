use std::{sync::Arc, time::Duration};

use uuid::Uuid;

use perimeter_config::EmbeddingProviderConfig;
use perimeter_domain::{ChunkFilter, ChunkRecord, EmbeddedChunk, RetrievalScope, ScoredChunk};
use perimeter_service::{
	ASSEMBLY_SEPARATOR, BoxFuture, ChunkStore, EmbeddingProvider, PerimeterService, Providers,
	ResolveRequest, ResolvedContext, ServiceError, ServiceResult,
};
use perimeter_testkit::{
	FailingTokenCounter, MemoryBackends, MemoryChunks, StubEmbedding, TEST_VECTOR_DIM,
};

use super::{Harness, words};

struct SlowEmbedding {
	delay: Duration,
	inner: StubEmbedding,
}
impl EmbeddingProvider for SlowEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, perimeter_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			tokio::time::sleep(self.delay).await;

			self.inner.embed(cfg, texts).await
		})
	}
}

/// Chunk store whose full-document fetch stalls; similarity search stays fast.
struct SlowFetch {
	delay: Duration,
	inner: Arc<MemoryChunks>,
}
impl ChunkStore for SlowFetch {
	fn upsert<'a>(&'a self, chunks: &'a [EmbeddedChunk]) -> BoxFuture<'a, ServiceResult<()>> {
		self.inner.upsert(chunks)
	}

	fn delete_where<'a>(&'a self, doc_id: Uuid) -> BoxFuture<'a, ServiceResult<u64>> {
		self.inner.delete_where(doc_id)
	}

	fn similarity_search<'a>(
		&'a self,
		filter: &'a ChunkFilter,
		vector: &'a [f32],
		k: u32,
	) -> BoxFuture<'a, ServiceResult<Vec<ScoredChunk>>> {
		self.inner.similarity_search(filter, vector, k)
	}

	fn fetch_all_where<'a>(
		&'a self,
		filter: &'a ChunkFilter,
	) -> BoxFuture<'a, ServiceResult<Vec<ChunkRecord>>> {
		Box::pin(async move {
			tokio::time::sleep(self.delay).await;

			self.inner.fetch_all_where(filter).await
		})
	}
}

fn document_set(doc_ids: &[Uuid]) -> RetrievalScope {
	RetrievalScope::DocumentSet(doc_ids.to_vec())
}

#[tokio::test]
async fn small_document_set_is_returned_whole_in_request_order() {
	let harness = Harness::new();
	let first = harness.upload("owner1", "one two three").await;
	let second = harness.upload("owner1", "four five").await;
	let resolved = harness
		.service
		.resolve(ResolveRequest::new(document_set(&[second, first]), ""))
		.await
		.expect("Resolve must succeed.");
	let ResolvedContext::Text { text, token_count, doc_ids } = resolved else {
		panic!("Expected direct assembly, got {resolved:?}.");
	};

	assert_eq!(text, format!("four five{ASSEMBLY_SEPARATOR}one two three"));
	assert_eq!(token_count, 5);
	assert_eq!(doc_ids, vec![second, first]);
}

#[tokio::test]
async fn assembled_text_is_the_exact_chunk_concatenation() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", &words("w", 20)).await;
	let expected = harness
		.chunks(doc_id)
		.into_iter()
		.map(|chunk| chunk.text)
		.collect::<Vec<_>>()
		.join(ASSEMBLY_SEPARATOR);
	let resolved = harness
		.service
		.resolve(ResolveRequest::new(document_set(&[doc_id]), "unused"))
		.await
		.expect("Resolve must succeed.");

	assert!(matches!(resolved, ResolvedContext::Text { text, .. } if text == expected));
}

#[tokio::test]
async fn over_budget_document_set_falls_back_to_similarity() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", &words("w", 100)).await;
	let other = harness.upload("owner2", &words("w", 10)).await;
	let mut req = ResolveRequest::new(document_set(&[doc_id]), "w42 w43");

	req.top_k = Some(2);

	let resolved = harness.service.resolve(req).await.expect("Resolve must succeed.");
	let ResolvedContext::Chunks { chunks } = resolved else {
		panic!("Expected similarity chunks, got {resolved:?}.");
	};

	assert_eq!(chunks.len(), 2);
	assert!(chunks.iter().all(|scored| scored.chunk.doc_id == doc_id));
	assert!(chunks.iter().all(|scored| scored.chunk.doc_id != other));
}

#[tokio::test]
async fn request_budget_overrides_the_configured_one() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "one two three four").await;
	let mut req = ResolveRequest::new(document_set(&[doc_id]), "two");

	req.token_budget = Some(3);

	let resolved = harness.service.resolve(req).await.expect("Resolve must succeed.");

	assert!(matches!(resolved, ResolvedContext::Chunks { .. }));
}

#[tokio::test]
async fn top_k_defaults_and_clamps() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", &words("w", 100)).await;
	let scope = RetrievalScope::SingleDocument(doc_id);
	let mut counts = Vec::new();

	for top_k in [None, Some(0), Some(4), Some(50)] {
		let mut req = ResolveRequest::new(scope.clone(), "w7");

		req.top_k = top_k;

		match harness.service.resolve(req).await.expect("Resolve must succeed.") {
			ResolvedContext::Chunks { chunks } => counts.push(chunks.len()),
			other => panic!("Expected similarity chunks, got {other:?}."),
		}
	}

	assert_eq!(counts, vec![3, 3, 4, 5]);
}

#[tokio::test]
async fn empty_scopes_resolve_to_nothing() {
	let harness = Harness::new();

	for scope in [
		RetrievalScope::DocumentSet(Vec::new()),
		RetrievalScope::Perimeter("   ".to_string()),
		RetrievalScope::DocumentSet(vec![Uuid::new_v4()]),
	] {
		let resolved = harness
			.service
			.resolve(ResolveRequest::new(scope, "anything"))
			.await
			.expect("Resolve must succeed.");

		assert!(matches!(resolved, ResolvedContext::Empty));
	}
}

#[tokio::test]
async fn similarity_requires_a_query() {
	let harness = Harness::new();

	harness.upload("owner1", "alpha").await;

	let err = harness
		.service
		.resolve(ResolveRequest::new(RetrievalScope::Perimeter("owner1".to_string()), "  "))
		.await
		.expect_err("Blank query must be rejected.");

	assert!(matches!(err, ServiceError::InvalidRequest { .. }));
}

#[tokio::test]
async fn perimeter_scope_never_leaks_other_documents() {
	let harness = Harness::new();
	let mine = harness.upload("owner1", "alpha beta").await;

	harness.upload("owner2", "alpha beta").await;
	harness.service.share(mine, "group10").await.expect("Share must succeed.");

	for scope in ["owner1", "group10"] {
		let resolved = harness
			.service
			.resolve(ResolveRequest::new(RetrievalScope::Perimeter(scope.to_string()), "alpha"))
			.await
			.expect("Resolve must succeed.");
		let ResolvedContext::Chunks { chunks } = resolved else {
			panic!("Expected similarity chunks, got {resolved:?}.");
		};

		assert!(chunks.iter().all(|scored| scored.chunk.doc_id == mine));
	}

	let prefix = harness
		.service
		.resolve(ResolveRequest::new(RetrievalScope::Perimeter("group1".to_string()), "alpha"))
		.await
		.expect("Resolve must succeed.");

	assert!(matches!(prefix, ResolvedContext::Empty));
}

#[tokio::test]
async fn rate_limited_query_embedding_is_reported() {
	let harness = Harness::new();

	harness.upload("owner1", "alpha").await;
	harness.embedding.rate_limit_next(1);

	let err = harness
		.service
		.resolve(ResolveRequest::new(RetrievalScope::Perimeter("owner1".to_string()), "alpha"))
		.await
		.expect_err("Throttled provider must surface.");

	assert!(matches!(err, ServiceError::RateLimited { .. }));
}

#[tokio::test]
async fn tokenizer_failure_is_not_papered_over() {
	let memory = MemoryBackends::new();
	let providers = Providers::new(perimeter_testkit::word_tokenizer())
		.with_embedding(Arc::new(StubEmbedding::new(TEST_VECTOR_DIM)))
		.with_token_counter(Arc::new(FailingTokenCounter));
	let harness = Harness {
		service: PerimeterService::with_providers(
			perimeter_testkit::test_config(),
			memory.backends(),
			providers,
		),
		memory,
		embedding: Arc::new(StubEmbedding::new(TEST_VECTOR_DIM)),
	};
	let doc_id = harness.upload("owner1", "alpha beta").await;
	let err = harness
		.service
		.resolve(ResolveRequest::new(document_set(&[doc_id]), "alpha"))
		.await
		.expect_err("Counting failure must surface.");

	assert!(matches!(err, ServiceError::TokenizationFailed { .. }));
}

#[tokio::test]
async fn slow_search_hits_the_deadline() {
	let memory = MemoryBackends::new();
	let slow = SlowEmbedding {
		delay: Duration::from_millis(300),
		inner: StubEmbedding::new(TEST_VECTOR_DIM),
	};
	let fast = Providers::new(perimeter_testkit::word_tokenizer())
		.with_embedding(Arc::new(StubEmbedding::new(TEST_VECTOR_DIM)));
	let indexer =
		PerimeterService::with_providers(perimeter_testkit::test_config(), memory.backends(), fast);
	let harness = Harness {
		service: indexer,
		memory: memory.clone(),
		embedding: Arc::new(StubEmbedding::new(TEST_VECTOR_DIM)),
	};

	harness.upload("owner1", "alpha beta").await;

	let reader = PerimeterService::with_providers(
		perimeter_testkit::test_config(),
		memory.backends(),
		Providers::new(perimeter_testkit::word_tokenizer()).with_embedding(Arc::new(slow)),
	);
	let mut req = ResolveRequest::new(RetrievalScope::Perimeter("owner1".to_string()), "alpha");

	req.deadline = Some(Duration::from_millis(30));

	let err = reader.resolve(req).await.expect_err("Deadline must trip.");

	assert!(matches!(err, ServiceError::DeadlineExceeded { .. }));
}

#[tokio::test]
async fn stalled_assembly_falls_back_to_similarity() {
	let harness = Harness::new();
	let doc_id = harness.upload("owner1", "alpha beta gamma").await;
	let mut backends = harness.memory.backends();

	backends.chunks = Arc::new(SlowFetch {
		delay: Duration::from_millis(500),
		inner: harness.memory.chunks.clone(),
	});

	let reader = PerimeterService::with_providers(
		perimeter_testkit::test_config(),
		backends,
		Providers::new(perimeter_testkit::word_tokenizer())
			.with_embedding(Arc::new(StubEmbedding::new(TEST_VECTOR_DIM))),
	);
	let mut req = ResolveRequest::new(document_set(&[doc_id]), "alpha");

	req.deadline = Some(Duration::from_millis(200));

	let resolved = reader.resolve(req).await.expect("Fallback must answer in time.");
	let ResolvedContext::Chunks { chunks } = resolved else {
		panic!("Expected similarity results, got {resolved:?}.");
	};

	assert!(!chunks.is_empty());
	assert!(chunks.iter().all(|scored| scored.chunk.doc_id == doc_id));
}
