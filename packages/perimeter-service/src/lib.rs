pub mod backends;
pub mod indexing;
pub mod jobs;
pub mod locks;
pub mod propagation;
pub mod resolve;

mod error;

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use time::OffsetDateTime;
use uuid::Uuid;

pub use error::{ServiceError, ServiceResult};
pub use jobs::JobExecution;
pub use locks::{DocumentGuard, LocalDocumentLocks};
pub use propagation::{GroupDeletion, PropagationOutcome, UploadRequest, UploadedDocument};
pub use resolve::{ASSEMBLY_SEPARATOR, ResolveRequest, ResolvedContext};
use perimeter_chunking::{TokenCounter, Tokenizer};
use perimeter_config::{Config, EmbeddingProviderConfig};
use perimeter_domain::{
	ChunkFilter, ChunkRecord, Document, DocumentStatus, EmbeddedChunk, Job, JobStatus, JobType,
	NewDocument, Perimeter, ScoredChunk, SharedGroup,
};
use perimeter_providers::embedding;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, perimeter_providers::Result<Vec<Vec<f32>>>>;
}

/// Vector store holding perimeter-stamped chunks.
pub trait ChunkStore
where
	Self: Send + Sync,
{
	fn upsert<'a>(&'a self, chunks: &'a [EmbeddedChunk]) -> BoxFuture<'a, ServiceResult<()>>;

	/// Removes every chunk of the document and returns how many were removed.
	fn delete_where<'a>(&'a self, doc_id: Uuid) -> BoxFuture<'a, ServiceResult<u64>>;

	fn similarity_search<'a>(
		&'a self,
		filter: &'a ChunkFilter,
		vector: &'a [f32],
		k: u32,
	) -> BoxFuture<'a, ServiceResult<Vec<ScoredChunk>>>;

	fn fetch_all_where<'a>(
		&'a self,
		filter: &'a ChunkFilter,
	) -> BoxFuture<'a, ServiceResult<Vec<ChunkRecord>>>;
}

pub trait DocumentStore
where
	Self: Send + Sync,
{
	fn insert_document<'a>(
		&'a self,
		doc: &'a NewDocument,
		now: OffsetDateTime,
	) -> BoxFuture<'a, ServiceResult<()>>;

	fn get_document<'a>(&'a self, doc_id: Uuid) -> BoxFuture<'a, ServiceResult<Option<Document>>>;

	fn get_raw_content<'a>(&'a self, doc_id: Uuid) -> BoxFuture<'a, ServiceResult<Option<String>>>;

	fn get_perimeter<'a>(&'a self, doc_id: Uuid)
	-> BoxFuture<'a, ServiceResult<Option<Perimeter>>>;

	/// Documents stamped with `token` that `token` does not own, oldest first.
	fn list_with_token<'a>(&'a self, token: &'a str) -> BoxFuture<'a, ServiceResult<Vec<Uuid>>>;

	fn set_perimeter<'a>(
		&'a self,
		doc_id: Uuid,
		perimeter: &'a Perimeter,
		now: OffsetDateTime,
	) -> BoxFuture<'a, ServiceResult<()>>;

	fn set_status<'a>(
		&'a self,
		doc_id: Uuid,
		status: DocumentStatus,
		now: OffsetDateTime,
	) -> BoxFuture<'a, ServiceResult<()>>;

	fn delete_document<'a>(&'a self, doc_id: Uuid) -> BoxFuture<'a, ServiceResult<bool>>;
}

pub trait GroupStore
where
	Self: Send + Sync,
{
	fn create_group<'a>(&'a self, group: &'a SharedGroup) -> BoxFuture<'a, ServiceResult<()>>;

	fn get_group<'a>(&'a self, group_id: &'a str)
	-> BoxFuture<'a, ServiceResult<Option<SharedGroup>>>;

	fn add_document<'a>(
		&'a self,
		group_id: &'a str,
		doc_id: Uuid,
		now: OffsetDateTime,
	) -> BoxFuture<'a, ServiceResult<()>>;

	fn remove_document<'a>(
		&'a self,
		group_id: &'a str,
		doc_id: Uuid,
	) -> BoxFuture<'a, ServiceResult<()>>;

	fn list_documents<'a>(&'a self, group_id: &'a str) -> BoxFuture<'a, ServiceResult<Vec<Uuid>>>;

	fn delete_group<'a>(&'a self, group_id: &'a str) -> BoxFuture<'a, ServiceResult<bool>>;
}

pub trait JobStore
where
	Self: Send + Sync,
{
	fn save<'a>(&'a self, job: &'a Job) -> BoxFuture<'a, ServiceResult<()>>;

	fn get<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, ServiceResult<Option<Job>>>;

	/// Conditional transition. Returns `false` when the job is not currently in `from`.
	fn update_status<'a>(
		&'a self,
		job_id: Uuid,
		from: JobStatus,
		to: JobStatus,
		last_error: Option<&'a str>,
		now: OffsetDateTime,
	) -> BoxFuture<'a, ServiceResult<bool>>;

	fn list<'a>(
		&'a self,
		job_type: JobType,
		status: JobStatus,
	) -> BoxFuture<'a, ServiceResult<Vec<Job>>>;
}

/// Per-document mutual exclusion for every write that touches a document's chunks or perimeter.
pub trait DocumentLocks
where
	Self: Send + Sync,
{
	/// Waits up to `wait` for the lock and fails with `ConcurrencyConflict` afterwards.
	fn acquire<'a>(
		&'a self,
		doc_id: Uuid,
		wait: Duration,
	) -> BoxFuture<'a, ServiceResult<DocumentGuard>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub token_counter: Arc<dyn TokenCounter>,
	pub tokenizer: Arc<Tokenizer>,
}
impl Providers {
	/// HTTP embeddings, with chunking and budget counting sharing one tokenizer.
	pub fn new(tokenizer: Tokenizer) -> Self {
		let tokenizer = Arc::new(tokenizer);

		Self {
			embedding: Arc::new(DefaultProviders),
			token_counter: tokenizer.clone(),
			tokenizer,
		}
	}

	pub fn with_embedding(mut self, embedding: Arc<dyn EmbeddingProvider>) -> Self {
		self.embedding = embedding;

		self
	}

	pub fn with_token_counter(mut self, token_counter: Arc<dyn TokenCounter>) -> Self {
		self.token_counter = token_counter;

		self
	}
}

#[derive(Clone)]
pub struct Backends {
	pub chunks: Arc<dyn ChunkStore>,
	pub documents: Arc<dyn DocumentStore>,
	pub groups: Arc<dyn GroupStore>,
	pub jobs: Arc<dyn JobStore>,
	pub locks: Arc<dyn DocumentLocks>,
}

pub struct PerimeterService {
	pub cfg: Config,
	pub backends: Backends,
	pub providers: Providers,
}
impl PerimeterService {
	pub fn new(cfg: Config, backends: Backends, tokenizer: Tokenizer) -> Self {
		Self::with_providers(cfg, backends, Providers::new(tokenizer))
	}

	pub fn with_providers(cfg: Config, backends: Backends, providers: Providers) -> Self {
		Self { cfg, backends, providers }
	}

	pub(crate) async fn lock_document(&self, doc_id: Uuid) -> ServiceResult<DocumentGuard> {
		let wait = Duration::from_millis(self.cfg.propagation.lock_wait_ms);

		self.backends.locks.acquire(doc_id, wait).await
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, perimeter_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

pub(crate) fn now() -> OffsetDateTime {
	OffsetDateTime::now_utc()
}
