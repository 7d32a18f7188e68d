//! Production backends: Postgres for documents, groups, and jobs; Qdrant for chunks.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Backends, BoxFuture, ChunkStore, DocumentStore, GroupStore, JobStore, ServiceError,
	ServiceResult,
};
use perimeter_domain::{
	ChunkFilter, ChunkRecord, Document, DocumentStatus, EmbeddedChunk, Job, JobStatus, JobType,
	NewDocument, Perimeter, ScoredChunk, SharedGroup,
};
use perimeter_storage::{db::Db, documents, groups, jobs, qdrant::QdrantStore};

impl Backends {
	pub fn production(db: Db, qdrant: QdrantStore) -> Self {
		let db = Arc::new(db);

		Self {
			chunks: Arc::new(qdrant),
			documents: db.clone(),
			groups: db.clone(),
			jobs: db.clone(),
			locks: db,
		}
	}
}

impl ChunkStore for QdrantStore {
	fn upsert<'a>(&'a self, chunks: &'a [EmbeddedChunk]) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move { Ok(self.upsert_chunks(chunks).await?) })
	}

	fn delete_where<'a>(&'a self, doc_id: Uuid) -> BoxFuture<'a, ServiceResult<u64>> {
		Box::pin(async move { Ok(self.delete_document_chunks(doc_id).await?) })
	}

	fn similarity_search<'a>(
		&'a self,
		filter: &'a ChunkFilter,
		vector: &'a [f32],
		k: u32,
	) -> BoxFuture<'a, ServiceResult<Vec<ScoredChunk>>> {
		Box::pin(async move { Ok(self.search_chunks(filter, vector, k).await?) })
	}

	fn fetch_all_where<'a>(
		&'a self,
		filter: &'a ChunkFilter,
	) -> BoxFuture<'a, ServiceResult<Vec<ChunkRecord>>> {
		Box::pin(async move { Ok(self.fetch_chunks(filter).await?) })
	}
}

impl DocumentStore for Db {
	fn insert_document<'a>(
		&'a self,
		doc: &'a NewDocument,
		now: OffsetDateTime,
	) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move { Ok(documents::insert_document(&self.pool, doc, now).await?) })
	}

	fn get_document<'a>(&'a self, doc_id: Uuid) -> BoxFuture<'a, ServiceResult<Option<Document>>> {
		Box::pin(async move { Ok(documents::fetch_document(&self.pool, doc_id).await?) })
	}

	fn get_raw_content<'a>(&'a self, doc_id: Uuid) -> BoxFuture<'a, ServiceResult<Option<String>>> {
		Box::pin(async move { Ok(documents::fetch_content(&self.pool, doc_id).await?) })
	}

	fn get_perimeter<'a>(
		&'a self,
		doc_id: Uuid,
	) -> BoxFuture<'a, ServiceResult<Option<Perimeter>>> {
		Box::pin(async move { Ok(documents::fetch_perimeter(&self.pool, doc_id).await?) })
	}

	fn list_with_token<'a>(&'a self, token: &'a str) -> BoxFuture<'a, ServiceResult<Vec<Uuid>>> {
		Box::pin(async move { Ok(documents::list_documents_with_token(&self.pool, token).await?) })
	}

	fn set_perimeter<'a>(
		&'a self,
		doc_id: Uuid,
		perimeter: &'a Perimeter,
		now: OffsetDateTime,
	) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move {
			if !documents::update_perimeter(&self.pool, doc_id, perimeter, now).await? {
				return Err(missing_document(doc_id));
			}

			Ok(())
		})
	}

	fn set_status<'a>(
		&'a self,
		doc_id: Uuid,
		status: DocumentStatus,
		now: OffsetDateTime,
	) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move {
			if !documents::update_status(&self.pool, doc_id, status, now).await? {
				return Err(missing_document(doc_id));
			}

			Ok(())
		})
	}

	fn delete_document<'a>(&'a self, doc_id: Uuid) -> BoxFuture<'a, ServiceResult<bool>> {
		Box::pin(async move { Ok(documents::delete_document(&self.pool, doc_id).await?) })
	}
}

impl GroupStore for Db {
	fn create_group<'a>(&'a self, group: &'a SharedGroup) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move { Ok(groups::insert_group(&self.pool, group).await?) })
	}

	fn get_group<'a>(
		&'a self,
		group_id: &'a str,
	) -> BoxFuture<'a, ServiceResult<Option<SharedGroup>>> {
		Box::pin(async move { Ok(groups::fetch_group(&self.pool, group_id).await?) })
	}

	fn add_document<'a>(
		&'a self,
		group_id: &'a str,
		doc_id: Uuid,
		now: OffsetDateTime,
	) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move {
			Ok(groups::add_group_document(&self.pool, group_id, doc_id, now).await?)
		})
	}

	fn remove_document<'a>(
		&'a self,
		group_id: &'a str,
		doc_id: Uuid,
	) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move {
			Ok(groups::remove_group_document(&self.pool, group_id, doc_id).await?)
		})
	}

	fn list_documents<'a>(&'a self, group_id: &'a str) -> BoxFuture<'a, ServiceResult<Vec<Uuid>>> {
		Box::pin(async move { Ok(groups::list_group_documents(&self.pool, group_id).await?) })
	}

	fn delete_group<'a>(&'a self, group_id: &'a str) -> BoxFuture<'a, ServiceResult<bool>> {
		Box::pin(async move { Ok(groups::delete_group(&self.pool, group_id).await?) })
	}
}

impl JobStore for Db {
	fn save<'a>(&'a self, job: &'a Job) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move { Ok(jobs::insert_job(&self.pool, job).await?) })
	}

	fn get<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, ServiceResult<Option<Job>>> {
		Box::pin(async move { Ok(jobs::fetch_job(&self.pool, job_id).await?) })
	}

	fn update_status<'a>(
		&'a self,
		job_id: Uuid,
		from: JobStatus,
		to: JobStatus,
		last_error: Option<&'a str>,
		now: OffsetDateTime,
	) -> BoxFuture<'a, ServiceResult<bool>> {
		Box::pin(async move {
			from.transition(to)?;

			Ok(jobs::update_job_status(&self.pool, job_id, from, to, last_error, now).await?)
		})
	}

	fn list<'a>(
		&'a self,
		job_type: JobType,
		status: JobStatus,
	) -> BoxFuture<'a, ServiceResult<Vec<Job>>> {
		Box::pin(async move { Ok(jobs::list_jobs(&self.pool, job_type, status).await?) })
	}
}

pub(crate) fn missing_document(doc_id: Uuid) -> ServiceError {
	ServiceError::NotFound { message: format!("Document {doc_id} does not exist.") }
}
