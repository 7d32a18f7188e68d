use serde::Serialize;
use uuid::Uuid;

use crate::Perimeter;

/// A stored fragment of a document. `perimeter` is a copy of the document's perimeter taken at
/// indexing time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChunkRecord {
	pub chunk_id: Uuid,
	pub doc_id: Uuid,
	pub chunk_index: i32,
	pub start_offset: i32,
	pub end_offset: i32,
	pub text: String,
	pub owner: String,
	pub perimeter: Perimeter,
}

#[derive(Clone, Debug)]
pub struct EmbeddedChunk {
	pub record: ChunkRecord,
	pub vector: Vec<f32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScoredChunk {
	#[serde(flatten)]
	pub chunk: ChunkRecord,
	pub score: f32,
}
