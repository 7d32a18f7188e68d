mod acceptance {
	mod concurrency;
	mod groups;
	mod jobs;
	mod propagation;
	mod resolve;

	use std::sync::Arc;

	use uuid::Uuid;

	use perimeter_config::Config;
	use perimeter_domain::{ChunkRecord, Perimeter};
	use perimeter_service::{PerimeterService, Providers, UploadRequest};
	use perimeter_testkit::{MemoryBackends, StubEmbedding, TEST_VECTOR_DIM};

	pub struct Harness {
		pub service: PerimeterService,
		pub memory: MemoryBackends,
		pub embedding: Arc<StubEmbedding>,
	}
	impl Harness {
		pub fn new() -> Self {
			Self::with_config(perimeter_testkit::test_config())
		}

		pub fn with_config(cfg: Config) -> Self {
			let memory = MemoryBackends::new();
			let embedding = Arc::new(StubEmbedding::new(TEST_VECTOR_DIM));
			let providers = Providers::new(perimeter_testkit::word_tokenizer())
				.with_embedding(embedding.clone());
			let service = PerimeterService::with_providers(cfg, memory.backends(), providers);

			Self { service, memory, embedding }
		}

		pub async fn upload(&self, owner: &str, content: &str) -> Uuid {
			self.service
				.upload_document(UploadRequest {
					owner: owner.to_string(),
					name: "notes.txt".to_string(),
					content_type: "text/plain".to_string(),
					content: content.to_string(),
				})
				.await
				.expect("Upload must succeed.")
				.doc_id
		}

		pub fn chunks(&self, doc_id: Uuid) -> Vec<ChunkRecord> {
			self.memory.chunks.document_chunks(doc_id)
		}

		/// Every chunk carries the document's current perimeter.
		pub async fn assert_stamped(&self, doc_id: Uuid) {
			let doc = self
				.service
				.backends
				.documents
				.get_document(doc_id)
				.await
				.expect("Document lookup.")
				.expect("Document must exist.");

			for chunk in self.chunks(doc_id) {
				assert_eq!(chunk.perimeter, doc.perimeter, "Chunk {} is stale.", chunk.chunk_id);
				assert_eq!(chunk.owner, doc.owner);
			}
		}
	}

	pub fn words(prefix: &str, count: usize) -> String {
		(0..count).map(|i| format!("{prefix}{i}")).collect::<Vec<_>>().join(" ")
	}

	pub fn perimeter(raw: &str) -> Perimeter {
		Perimeter::parse(raw)
	}
}
