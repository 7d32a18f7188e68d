//! In-memory stand-ins for the Postgres and Qdrant backends. They evaluate filters with
//! `ChunkFilter::matches`, the same predicate the Qdrant filter is built from.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex, MutexGuard},
};

use time::OffsetDateTime;
use uuid::Uuid;

use perimeter_domain::{
	ChunkFilter, ChunkRecord, Document, DocumentStatus, EmbeddedChunk, Job, JobStatus, JobType,
	NewDocument, Perimeter, ScoredChunk, SharedGroup,
};
use perimeter_service::{
	Backends, BoxFuture, ChunkStore, DocumentStore, GroupStore, JobStore, LocalDocumentLocks,
	ServiceError, ServiceResult,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}

fn missing(what: &str, id: impl std::fmt::Display) -> ServiceError {
	ServiceError::NotFound { message: format!("{what} {id} does not exist.") }
}

/// Handles to every in-memory backend, for assertions next to the service under test.
#[derive(Clone, Default)]
pub struct MemoryBackends {
	pub chunks: Arc<MemoryChunks>,
	pub documents: Arc<MemoryDocuments>,
	pub jobs: Arc<MemoryJobs>,
	pub locks: Arc<LocalDocumentLocks>,
}
impl MemoryBackends {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn backends(&self) -> Backends {
		Backends {
			chunks: self.chunks.clone(),
			documents: self.documents.clone(),
			groups: self.documents.clone(),
			jobs: self.jobs.clone(),
			locks: self.locks.clone(),
		}
	}
}

#[derive(Default)]
pub struct MemoryChunks {
	points: Mutex<Vec<EmbeddedChunk>>,
}
impl MemoryChunks {
	pub fn records(&self) -> Vec<ChunkRecord> {
		lock(&self.points).iter().map(|point| point.record.clone()).collect()
	}

	pub fn document_chunks(&self, doc_id: Uuid) -> Vec<ChunkRecord> {
		let mut records =
			self.records().into_iter().filter(|record| record.doc_id == doc_id).collect::<Vec<_>>();

		records.sort_by_key(|record| record.chunk_index);

		records
	}

	pub fn len(&self) -> usize {
		lock(&self.points).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn matching(&self, filter: &ChunkFilter) -> Vec<EmbeddedChunk> {
		lock(&self.points)
			.iter()
			.filter(|point| {
				filter.matches(point.record.doc_id, &point.record.perimeter.to_string())
			})
			.cloned()
			.collect()
	}
}
impl ChunkStore for MemoryChunks {
	fn upsert<'a>(&'a self, chunks: &'a [EmbeddedChunk]) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move {
			let mut points = lock(&self.points);

			for chunk in chunks {
				points.retain(|point| point.record.chunk_id != chunk.record.chunk_id);
				points.push(chunk.clone());
			}

			Ok(())
		})
	}

	fn delete_where<'a>(&'a self, doc_id: Uuid) -> BoxFuture<'a, ServiceResult<u64>> {
		Box::pin(async move {
			let mut points = lock(&self.points);
			let before = points.len();

			points.retain(|point| point.record.doc_id != doc_id);

			Ok((before - points.len()) as u64)
		})
	}

	fn similarity_search<'a>(
		&'a self,
		filter: &'a ChunkFilter,
		vector: &'a [f32],
		k: u32,
	) -> BoxFuture<'a, ServiceResult<Vec<ScoredChunk>>> {
		Box::pin(async move {
			let mut scored = self
				.matching(filter)
				.into_iter()
				.map(|point| ScoredChunk {
					score: cosine(&point.vector, vector),
					chunk: point.record,
				})
				.collect::<Vec<_>>();

			scored.sort_by(|a, b| b.score.total_cmp(&a.score));
			scored.truncate(k as usize);

			Ok(scored)
		})
	}

	fn fetch_all_where<'a>(
		&'a self,
		filter: &'a ChunkFilter,
	) -> BoxFuture<'a, ServiceResult<Vec<ChunkRecord>>> {
		Box::pin(async move {
			Ok(self.matching(filter).into_iter().map(|point| point.record).collect())
		})
	}
}

struct StoredDocument {
	document: Document,
	content: String,
}

#[derive(Default)]
struct DocumentTables {
	documents: HashMap<Uuid, StoredDocument>,
	groups: HashMap<String, SharedGroup>,
	/// Insertion order stands in for `created_at` ordering.
	members: Vec<(String, Uuid)>,
}

/// Documents and groups share one table set so deletes cascade to memberships.
#[derive(Default)]
pub struct MemoryDocuments {
	tables: Mutex<DocumentTables>,
}
impl MemoryDocuments {
	pub fn status(&self, doc_id: Uuid) -> Option<DocumentStatus> {
		lock(&self.tables).documents.get(&doc_id).map(|stored| stored.document.status)
	}

	pub fn members(&self, group_id: &str) -> Vec<Uuid> {
		lock(&self.tables)
			.members
			.iter()
			.filter(|(group, _)| group == group_id)
			.map(|(_, doc_id)| *doc_id)
			.collect()
	}

	fn update(
		&self,
		doc_id: Uuid,
		apply: impl FnOnce(&mut Document),
		now: OffsetDateTime,
	) -> ServiceResult<()> {
		let mut tables = lock(&self.tables);
		let stored = tables.documents.get_mut(&doc_id).ok_or_else(|| missing("Document", doc_id))?;

		apply(&mut stored.document);

		stored.document.updated_at = now;

		Ok(())
	}
}
impl DocumentStore for MemoryDocuments {
	fn insert_document<'a>(
		&'a self,
		doc: &'a NewDocument,
		now: OffsetDateTime,
	) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move {
			let mut tables = lock(&self.tables);

			if tables.documents.contains_key(&doc.doc_id) {
				return Err(ServiceError::Conflict {
					message: format!("Document {} already exists.", doc.doc_id),
				});
			}

			let document = Document {
				doc_id: doc.doc_id,
				owner: doc.owner.clone(),
				name: doc.name.clone(),
				content_type: doc.content_type.clone(),
				perimeter: doc.perimeter.clone(),
				status: DocumentStatus::Requested,
				created_at: now,
				updated_at: now,
			};

			tables
				.documents
				.insert(doc.doc_id, StoredDocument { document, content: doc.content.clone() });

			Ok(())
		})
	}

	fn get_document<'a>(&'a self, doc_id: Uuid) -> BoxFuture<'a, ServiceResult<Option<Document>>> {
		Box::pin(async move {
			Ok(lock(&self.tables).documents.get(&doc_id).map(|stored| stored.document.clone()))
		})
	}

	fn get_raw_content<'a>(&'a self, doc_id: Uuid) -> BoxFuture<'a, ServiceResult<Option<String>>> {
		Box::pin(async move {
			Ok(lock(&self.tables).documents.get(&doc_id).map(|stored| stored.content.clone()))
		})
	}

	fn get_perimeter<'a>(
		&'a self,
		doc_id: Uuid,
	) -> BoxFuture<'a, ServiceResult<Option<Perimeter>>> {
		Box::pin(async move {
			Ok(lock(&self.tables)
				.documents
				.get(&doc_id)
				.map(|stored| stored.document.perimeter.clone()))
		})
	}

	fn list_with_token<'a>(&'a self, token: &'a str) -> BoxFuture<'a, ServiceResult<Vec<Uuid>>> {
		Box::pin(async move {
			let tables = lock(&self.tables);
			let mut stamped = tables
				.documents
				.values()
				.map(|stored| &stored.document)
				.filter(|doc| doc.owner != token && doc.perimeter.contains(token))
				.map(|doc| (doc.created_at, doc.doc_id))
				.collect::<Vec<_>>();

			stamped.sort();

			Ok(stamped.into_iter().map(|(_, doc_id)| doc_id).collect())
		})
	}

	fn set_perimeter<'a>(
		&'a self,
		doc_id: Uuid,
		perimeter: &'a Perimeter,
		now: OffsetDateTime,
	) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move { self.update(doc_id, |doc| doc.perimeter = perimeter.clone(), now) })
	}

	fn set_status<'a>(
		&'a self,
		doc_id: Uuid,
		status: DocumentStatus,
		now: OffsetDateTime,
	) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move { self.update(doc_id, |doc| doc.status = status, now) })
	}

	fn delete_document<'a>(&'a self, doc_id: Uuid) -> BoxFuture<'a, ServiceResult<bool>> {
		Box::pin(async move {
			let mut tables = lock(&self.tables);
			let removed = tables.documents.remove(&doc_id).is_some();

			tables.members.retain(|(_, member)| *member != doc_id);

			Ok(removed)
		})
	}
}
impl GroupStore for MemoryDocuments {
	fn create_group<'a>(&'a self, group: &'a SharedGroup) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move {
			lock(&self.tables).groups.insert(group.group_id.clone(), group.clone());

			Ok(())
		})
	}

	fn get_group<'a>(
		&'a self,
		group_id: &'a str,
	) -> BoxFuture<'a, ServiceResult<Option<SharedGroup>>> {
		Box::pin(async move { Ok(lock(&self.tables).groups.get(group_id).cloned()) })
	}

	fn add_document<'a>(
		&'a self,
		group_id: &'a str,
		doc_id: Uuid,
		_now: OffsetDateTime,
	) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move {
			let mut tables = lock(&self.tables);

			if !tables.groups.contains_key(group_id) {
				return Err(missing("Group", group_id));
			}
			if !tables.documents.contains_key(&doc_id) {
				return Err(missing("Document", doc_id));
			}
			if !tables.members.iter().any(|(group, member)| group == group_id && *member == doc_id)
			{
				tables.members.push((group_id.to_string(), doc_id));
			}

			Ok(())
		})
	}

	fn remove_document<'a>(
		&'a self,
		group_id: &'a str,
		doc_id: Uuid,
	) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move {
			lock(&self.tables)
				.members
				.retain(|(group, member)| !(group == group_id && *member == doc_id));

			Ok(())
		})
	}

	fn list_documents<'a>(&'a self, group_id: &'a str) -> BoxFuture<'a, ServiceResult<Vec<Uuid>>> {
		Box::pin(async move { Ok(self.members(group_id)) })
	}

	fn delete_group<'a>(&'a self, group_id: &'a str) -> BoxFuture<'a, ServiceResult<bool>> {
		Box::pin(async move {
			let mut tables = lock(&self.tables);
			let removed = tables.groups.remove(group_id).is_some();

			tables.members.retain(|(group, _)| group != group_id);

			Ok(removed)
		})
	}
}

#[derive(Default)]
pub struct MemoryJobs {
	jobs: Mutex<Vec<Job>>,
}
impl MemoryJobs {
	pub fn all(&self) -> Vec<Job> {
		lock(&self.jobs).clone()
	}
}
impl JobStore for MemoryJobs {
	fn save<'a>(&'a self, job: &'a Job) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move {
			let mut jobs = lock(&self.jobs);

			jobs.retain(|existing| existing.job_id != job.job_id);
			jobs.push(job.clone());

			Ok(())
		})
	}

	fn get<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, ServiceResult<Option<Job>>> {
		Box::pin(async move {
			Ok(lock(&self.jobs).iter().find(|job| job.job_id == job_id).cloned())
		})
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

			let mut jobs = lock(&self.jobs);
			let Some(job) = jobs.iter_mut().find(|job| job.job_id == job_id && job.status == from)
			else {
				return Ok(false);
			};

			job.status = to;
			job.updated_at = now;

			if let Some(last_error) = last_error {
				job.last_error = Some(last_error.to_string());
			}

			Ok(true)
		})
	}

	fn list<'a>(
		&'a self,
		job_type: JobType,
		status: JobStatus,
	) -> BoxFuture<'a, ServiceResult<Vec<Job>>> {
		Box::pin(async move {
			Ok(lock(&self.jobs)
				.iter()
				.filter(|job| job.job_type == job_type && job.status == status)
				.cloned()
				.collect())
		})
	}
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
	let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
	let denom = norm(a) * norm(b);

	if denom == 0.0 { 0.0 } else { dot / denom }
}
