pub const DENSE_VECTOR_NAME: &str = "dense";

const SCROLL_PAGE_SIZE: u32 = 256;
const KEYWORD_INDEXES: [&str; 2] = ["doc_id", "perimeter_tokens"];

use std::{collections::HashMap, time::Duration};

use qdrant_client::{
	Qdrant,
	client::Payload,
	qdrant::{
		Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollection,
		DeletePointsBuilder, Distance, FieldType, Filter, PointId, PointStruct, Query,
		QueryPointsBuilder, ScrollPointsBuilder, UpsertPointsBuilder, Value, Vector,
		VectorParamsBuilder, VectorsConfigBuilder, point_id::PointIdOptions, value::Kind,
	},
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use perimeter_domain::{ChunkFilter, ChunkRecord, EmbeddedChunk, Perimeter, ScoredChunk};

use crate::{Error, Result};

pub struct QdrantStore {
	pub client: Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &perimeter_config::Qdrant) -> Result<Self> {
		let client =
			Qdrant::from_url(&cfg.url).timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the chunk collection and its keyword payload indexes when missing.
	pub async fn ensure_collection(&self) -> Result<()> {
		let existing = self.client.list_collections().await?;

		if existing.collections.iter().any(|collection| collection.name == self.collection) {
			return Ok(());
		}

		let mut vectors_config = VectorsConfigBuilder::default();

		vectors_config.add_named_vector_params(
			DENSE_VECTOR_NAME,
			VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine),
		);

		let builder =
			CreateCollectionBuilder::new(self.collection.clone()).vectors_config(vectors_config);

		self.client.create_collection(builder).await?;

		for field_name in KEYWORD_INDEXES {
			let request = CreateFieldIndexCollection {
				collection_name: self.collection.clone(),
				wait: Some(true),
				field_name: field_name.to_string(),
				field_type: Some(FieldType::Keyword as i32),
				field_index_params: None,
				ordering: None,
			};

			self.client.create_field_index(request).await?;
		}

		tracing::info!(collection = %self.collection, "Created Qdrant chunk collection.");

		Ok(())
	}

	pub async fn upsert_chunks(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
		if chunks.is_empty() {
			return Ok(());
		}

		let mut points = Vec::with_capacity(chunks.len());

		for chunk in chunks {
			if chunk.vector.len() != self.vector_dim as usize {
				return Err(Error::InvalidArgument(format!(
					"Chunk {} has {} dimensions, collection expects {}.",
					chunk.record.chunk_id,
					chunk.vector.len(),
					self.vector_dim
				)));
			}

			let mut vector_map = HashMap::new();

			vector_map.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(chunk.vector.clone()));

			let payload = Payload::from(chunk_payload(&chunk.record));

			points.push(PointStruct::new(chunk.record.chunk_id.to_string(), vector_map, payload));
		}

		let upsert = UpsertPointsBuilder::new(self.collection.clone(), points).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	pub async fn count_chunks(&self, filter: &ChunkFilter) -> Result<u64> {
		let count = CountPointsBuilder::new(self.collection.clone())
			.filter(to_qdrant_filter(filter))
			.exact(true);
		let response = self.client.count(count).await?;

		Ok(response.result.map(|result| result.count).unwrap_or(0))
	}

	/// Removes every chunk of a document and returns how many there were. Callers hold the
	/// document's write lock, so the count cannot race with an upsert for the same document.
	pub async fn delete_document_chunks(&self, doc_id: Uuid) -> Result<u64> {
		let filter = ChunkFilter::Document(doc_id);
		let count = self.count_chunks(&filter).await?;

		if count == 0 {
			return Ok(0);
		}

		let delete = DeletePointsBuilder::new(self.collection.clone())
			.points(to_qdrant_filter(&filter))
			.wait(true);

		self.client.delete_points(delete).await?;

		Ok(count)
	}

	/// Nearest neighbours restricted to `filter`, in Qdrant's relevance order.
	pub async fn search_chunks(
		&self,
		filter: &ChunkFilter,
		vector: &[f32],
		limit: u32,
	) -> Result<Vec<ScoredChunk>> {
		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector.to_vec()))
			.using(DENSE_VECTOR_NAME)
			.filter(to_qdrant_filter(filter))
			.limit(limit as u64)
			.with_payload(true);
		let response = self.client.query(search).await?;
		let mut out = Vec::with_capacity(response.result.len());

		for point in response.result {
			let chunk = chunk_from_payload(point.id.as_ref(), &point.payload)?;

			out.push(ScoredChunk { chunk, score: point.score });
		}

		Ok(out)
	}

	/// Every chunk matching `filter`, unranked and in no particular order.
	pub async fn fetch_chunks(&self, filter: &ChunkFilter) -> Result<Vec<ChunkRecord>> {
		let qdrant_filter = to_qdrant_filter(filter);
		let mut out = Vec::new();
		let mut offset: Option<PointId> = None;

		loop {
			let mut scroll = ScrollPointsBuilder::new(self.collection.clone())
				.filter(qdrant_filter.clone())
				.limit(SCROLL_PAGE_SIZE)
				.with_payload(true)
				.with_vectors(false);

			if let Some(offset) = offset.take() {
				scroll = scroll.offset(offset);
			}

			let response = self.client.scroll(scroll).await?;

			for point in response.result {
				out.push(chunk_from_payload(point.id.as_ref(), &point.payload)?);
			}

			match response.next_page_offset {
				Some(next) => offset = Some(next),
				None => break,
			}
		}

		Ok(out)
	}
}

pub fn to_qdrant_filter(filter: &ChunkFilter) -> Filter {
	match filter {
		ChunkFilter::Document(doc_id) =>
			Filter::must([Condition::matches("doc_id", doc_id.to_string())]),
		ChunkFilter::Documents(doc_ids) => Filter::must([Condition::matches(
			"doc_id",
			doc_ids.iter().map(Uuid::to_string).collect::<Vec<_>>(),
		)]),
		ChunkFilter::PerimeterAny(tokens) => Filter {
			must: Vec::new(),
			should: tokens
				.iter()
				.map(|token| Condition::matches("perimeter_tokens", token.clone()))
				.collect(),
			must_not: Vec::new(),
			min_should: None,
		},
	}
}

fn chunk_payload(record: &ChunkRecord) -> HashMap<String, Value> {
	let mut payload_map = HashMap::new();

	payload_map.insert("doc_id".to_string(), Value::from(record.doc_id.to_string()));
	payload_map.insert("chunk_id".to_string(), Value::from(record.chunk_id.to_string()));
	payload_map.insert("chunk_index".to_string(), Value::from(record.chunk_index as i64));
	payload_map.insert("start_offset".to_string(), Value::from(record.start_offset as i64));
	payload_map.insert("end_offset".to_string(), Value::from(record.end_offset as i64));
	payload_map.insert("text".to_string(), Value::from(record.text.clone()));
	payload_map.insert("owner".to_string(), Value::from(record.owner.clone()));
	payload_map.insert("perimeter".to_string(), Value::from(record.perimeter.to_string()));
	payload_map.insert(
		"perimeter_tokens".to_string(),
		Value::from(JsonValue::Array(
			record.perimeter.delimited_tokens().into_iter().map(JsonValue::String).collect(),
		)),
	);

	payload_map
}

fn chunk_from_payload(
	point_id: Option<&PointId>,
	payload: &HashMap<String, Value>,
) -> Result<ChunkRecord> {
	let chunk_id = point_id
		.and_then(point_id_to_uuid)
		.or_else(|| payload_uuid(payload, "chunk_id"))
		.ok_or_else(|| Error::InvalidPayload("chunk id is missing.".to_string()))?;
	let doc_id = payload_uuid(payload, "doc_id")
		.ok_or_else(|| Error::InvalidPayload(format!("chunk {chunk_id} has no doc_id.")))?;
	let text = payload_string(payload, "text")
		.ok_or_else(|| Error::InvalidPayload(format!("chunk {chunk_id} has no text.")))?;
	let perimeter = payload_string(payload, "perimeter")
		.ok_or_else(|| Error::InvalidPayload(format!("chunk {chunk_id} has no perimeter.")))?;

	Ok(ChunkRecord {
		chunk_id,
		doc_id,
		chunk_index: payload_i32(payload, "chunk_index").unwrap_or(0),
		start_offset: payload_i32(payload, "start_offset").unwrap_or(0),
		end_offset: payload_i32(payload, "end_offset").unwrap_or(0),
		text,
		owner: payload_string(payload, "owner").unwrap_or_default(),
		perimeter: Perimeter::parse(&perimeter),
	})
}

fn point_id_to_uuid(point_id: &PointId) -> Option<Uuid> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(id).ok(),
		_ => None,
	}
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	match &payload.get(key)?.kind {
		Some(Kind::StringValue(text)) => Some(text.clone()),
		_ => None,
	}
}

fn payload_uuid(payload: &HashMap<String, Value>, key: &str) -> Option<Uuid> {
	payload_string(payload, key).and_then(|text| Uuid::parse_str(&text).ok())
}

fn payload_i32(payload: &HashMap<String, Value>, key: &str) -> Option<i32> {
	match &payload.get(key)?.kind {
		Some(Kind::IntegerValue(value)) => i32::try_from(*value).ok(),
		Some(Kind::DoubleValue(value)) if value.fract() == 0.0 => i32::try_from(*value as i64).ok(),
		_ => None,
	}
}
