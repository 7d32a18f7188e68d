use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::perimeter;

/// What a content request is allowed to see. Constructed per request, never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalScope {
	SingleDocument(Uuid),
	/// A bounded, caller-known list of documents. Order is significant for direct assembly.
	DocumentSet(Vec<Uuid>),
	/// Whitespace separated visibility tokens. A chunk matches when any token is in its
	/// perimeter.
	Perimeter(String),
}
impl RetrievalScope {
	/// `None` when the scope selects nothing, which callers report as an empty result.
	pub fn filter(&self) -> Option<ChunkFilter> {
		match self {
			Self::SingleDocument(doc_id) => Some(ChunkFilter::Document(*doc_id)),
			Self::DocumentSet(doc_ids) => {
				let doc_ids = dedup_ids(doc_ids);

				if doc_ids.is_empty() { None } else { Some(ChunkFilter::Documents(doc_ids)) }
			},
			Self::Perimeter(scope) => {
				let tokens = perimeter::scope_tokens(scope);

				if tokens.is_empty() { None } else { Some(ChunkFilter::PerimeterAny(tokens)) }
			},
		}
	}

	pub fn allows_direct_assembly(&self) -> bool {
		matches!(self, Self::DocumentSet(_))
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Self::SingleDocument(_) => "single_document",
			Self::DocumentSet(_) => "document_set",
			Self::Perimeter(_) => "perimeter",
		}
	}
}

/// Store-independent chunk predicate. Each chunk store translates it into its native filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkFilter {
	Document(Uuid),
	Documents(Vec<Uuid>),
	/// Delimited tokens (`/group7/`), OR-combined.
	PerimeterAny(Vec<String>),
}
impl ChunkFilter {
	/// Reference evaluation against a chunk's owning document and its stamped perimeter string.
	pub fn matches(&self, doc_id: Uuid, stamped_perimeter: &str) -> bool {
		match self {
			Self::Document(id) => *id == doc_id,
			Self::Documents(ids) => ids.contains(&doc_id),
			Self::PerimeterAny(tokens) =>
				tokens.iter().any(|token| stamped_perimeter.contains(token.as_str())),
		}
	}

	/// Position of a document in the requested order, used to order direct assembly.
	pub fn document_rank(&self, doc_id: Uuid) -> usize {
		match self {
			Self::Documents(ids) => ids.iter().position(|id| *id == doc_id).unwrap_or(ids.len()),
			_ => 0,
		}
	}
}

fn dedup_ids(doc_ids: &[Uuid]) -> Vec<Uuid> {
	let mut out = Vec::with_capacity(doc_ids.len());

	for doc_id in doc_ids {
		if !out.contains(doc_id) {
			out.push(*doc_id);
		}
	}

	out
}
