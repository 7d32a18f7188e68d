use uuid::Uuid;

use crate::{PerimeterService, ServiceError, ServiceResult};
use perimeter_chunking::{Chunk, ChunkingConfig};
use perimeter_domain::{ChunkRecord, EmbeddedChunk, Perimeter};

impl PerimeterService {
	/// Replaces every chunk of `doc_id` with freshly embedded chunks of `text`, each stamped
	/// with `perimeter` and `owner`. Returns the number of chunks written.
	pub async fn index(
		&self,
		doc_id: Uuid,
		owner: &str,
		perimeter: &Perimeter,
		text: &str,
	) -> ServiceResult<usize> {
		let guard = self.lock_document(doc_id).await?;
		let result = self.index_locked(doc_id, owner, perimeter, text).await;

		guard.release().await;

		result
	}

	/// Removes every chunk of `doc_id`. Deleting a document with no chunks is a no-op.
	pub async fn delete_by_document(&self, doc_id: Uuid) -> ServiceResult<u64> {
		let guard = self.lock_document(doc_id).await?;
		let result = self.backends.chunks.delete_where(doc_id).await;

		guard.release().await;

		result
	}

	/// Caller must hold the document lock. Nothing is written until every chunk has a vector,
	/// so a failed embedding call leaves the previous chunks in place.
	pub(crate) async fn index_locked(
		&self,
		doc_id: Uuid,
		owner: &str,
		perimeter: &Perimeter,
		text: &str,
	) -> ServiceResult<usize> {
		let chunks = self.split(text)?;
		let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
		let vectors = self
			.providers
			.embedding
			.embed(&self.cfg.providers.embedding, &texts)
			.await
			.map_err(|err| match ServiceError::from(err) {
				rate_limited @ ServiceError::RateLimited { .. } => rate_limited,
				other => ServiceError::IndexingFailed { message: other.to_string() },
			})?;

		if vectors.len() != chunks.len() {
			return Err(ServiceError::IndexingFailed {
				message: format!(
					"Embedding provider returned {} vectors for {} chunks.",
					vectors.len(),
					chunks.len()
				),
			});
		}

		let records = chunks
			.into_iter()
			.zip(vectors)
			.map(|(chunk, vector)| embedded_chunk(doc_id, owner, perimeter, chunk, vector))
			.collect::<ServiceResult<Vec<_>>>()?;
		let replaced = self.backends.chunks.delete_where(doc_id).await?;

		self.backends.chunks.upsert(&records).await?;

		tracing::info!(
			%doc_id,
			chunk_count = records.len(),
			replaced,
			perimeter = %perimeter,
			"Indexed document."
		);

		Ok(records.len())
	}

	fn split(&self, text: &str) -> ServiceResult<Vec<Chunk>> {
		let chunking = &self.cfg.chunking;
		let cfg = ChunkingConfig {
			max_tokens: chunking.max_tokens,
			overlap_tokens: chunking.overlap_tokens,
			max_chunks: chunking.max_chunks_per_doc,
		};

		match perimeter_chunking::split_text(text, &cfg, &self.providers.tokenizer) {
			Ok(chunks) => Ok(chunks),
			Err(err @ perimeter_chunking::Error::TooManyChunks { .. }) =>
				Err(ServiceError::IndexingFailed { message: err.to_string() }),
			Err(err) => Err(err.into()),
		}
	}
}

fn embedded_chunk(
	doc_id: Uuid,
	owner: &str,
	perimeter: &Perimeter,
	chunk: Chunk,
	vector: Vec<f32>,
) -> ServiceResult<EmbeddedChunk> {
	let offset = |value: usize| {
		i32::try_from(value).map_err(|_| ServiceError::IndexingFailed {
			message: format!("Chunk offset {value} does not fit the chunk schema."),
		})
	};
	let record = ChunkRecord {
		chunk_id: Uuid::new_v4(),
		doc_id,
		chunk_index: chunk.chunk_index,
		start_offset: offset(chunk.start_offset)?,
		end_offset: offset(chunk.end_offset)?,
		text: chunk.text,
		owner: owner.to_string(),
		perimeter: perimeter.clone(),
	};

	Ok(EmbeddedChunk { record, vector })
}
