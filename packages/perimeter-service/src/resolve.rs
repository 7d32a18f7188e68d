use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::time::{self, Instant};
use uuid::Uuid;

use crate::{PerimeterService, ServiceError, ServiceResult};
use perimeter_chunking::TokenCounter;
use perimeter_domain::{ChunkFilter, ChunkRecord, RetrievalScope, ScoredChunk};

/// Joins chunk texts when a document set is returned whole.
pub const ASSEMBLY_SEPARATOR: &str = "\n\n";

#[derive(Clone, Debug)]
pub struct ResolveRequest {
	pub scope: RetrievalScope,
	pub query: String,
	/// Falls back to `retrieval.token_budget`.
	pub token_budget: Option<u32>,
	/// `None` and `Some(0)` fall back to `retrieval.default_top_k`.
	pub top_k: Option<u32>,
	/// Overall time allowed for resolution, including the similarity fallback.
	pub deadline: Option<Duration>,
}
impl ResolveRequest {
	pub fn new(scope: RetrievalScope, query: impl Into<String>) -> Self {
		Self { scope, query: query.into(), token_budget: None, top_k: None, deadline: None }
	}
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedContext {
	/// The scope selects no chunks.
	Empty,
	/// Every chunk of the document set, in request order, within the token budget.
	Text { text: String, token_count: usize, doc_ids: Vec<Uuid> },
	/// The top-k most relevant chunks inside the scope.
	Chunks { chunks: Vec<ScoredChunk> },
}

enum Assembly {
	Nothing,
	Fits { text: String, token_count: usize, doc_ids: Vec<Uuid> },
	OverBudget,
}

impl PerimeterService {
	/// Turns a scope and a query into context. Document sets that fit the budget come back as
	/// one text; everything else goes through similarity search restricted to the scope.
	pub async fn resolve(&self, req: ResolveRequest) -> ServiceResult<ResolvedContext> {
		let started = Instant::now();
		let deadline = req.deadline.map(|limit| started + limit);
		let Some(filter) = req.scope.filter() else {
			tracing::debug!(scope = req.scope.kind(), "Scope selects no documents.");

			return Ok(ResolvedContext::Empty);
		};

		if req.scope.allows_direct_assembly() {
			let budget = req.token_budget.unwrap_or(self.cfg.retrieval.token_budget) as usize;

			match self.assemble_within(&filter, budget, deadline).await? {
				Some(Assembly::Nothing) => return Ok(ResolvedContext::Empty),
				Some(Assembly::Fits { text, token_count, doc_ids }) => {
					tracing::info!(
						scope = req.scope.kind(),
						token_count,
						documents = doc_ids.len(),
						"Resolved document set by direct assembly."
					);

					return Ok(ResolvedContext::Text { text, token_count, doc_ids });
				},
				Some(Assembly::OverBudget) => {
					tracing::info!(budget, "Document set exceeds token budget. Using similarity.");
				},
				None => {
					tracing::warn!("Direct assembly ran out of time. Using similarity.");
				},
			}
		}

		self.similarity_within(&filter, &req, deadline).await
	}

	/// `None` means assembly was abandoned at half of the remaining deadline.
	async fn assemble_within(
		&self,
		filter: &ChunkFilter,
		budget: usize,
		deadline: Option<Instant>,
	) -> ServiceResult<Option<Assembly>> {
		let Some(deadline) = deadline else {
			return self.assemble(filter, budget).await.map(Some);
		};
		let share = deadline.saturating_duration_since(Instant::now()) / 2;

		match time::timeout(share, self.assemble(filter, budget)).await {
			Ok(assembly) => assembly.map(Some),
			Err(_) => Ok(None),
		}
	}

	async fn assemble(&self, filter: &ChunkFilter, budget: usize) -> ServiceResult<Assembly> {
		let mut chunks = self.backends.chunks.fetch_all_where(filter).await?;

		if chunks.is_empty() {
			return Ok(Assembly::Nothing);
		}

		chunks.sort_by_key(|chunk| {
			(filter.document_rank(chunk.doc_id), chunk.doc_id, chunk.chunk_index)
		});

		let counter = self.providers.token_counter.clone();
		let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
		let counted = tokio::task::spawn_blocking(move || count_within(counter, texts, budget))
			.await
			.map_err(|err| ServiceError::TokenizationFailed {
				message: format!("Token counting task failed: {err}."),
			})??;
		let Some(token_count) = counted else {
			return Ok(Assembly::OverBudget);
		};

		Ok(Assembly::Fits { text: join_texts(&chunks), token_count, doc_ids: doc_ids(&chunks) })
	}

	async fn similarity_within(
		&self,
		filter: &ChunkFilter,
		req: &ResolveRequest,
		deadline: Option<Instant>,
	) -> ServiceResult<ResolvedContext> {
		let limit = match deadline {
			Some(deadline) => deadline.saturating_duration_since(Instant::now()),
			None => Duration::from_millis(self.cfg.retrieval.search_timeout_ms),
		};

		match time::timeout(limit, self.similarity(filter, req)).await {
			Ok(result) => result,
			Err(_) => Err(ServiceError::DeadlineExceeded {
				message: format!(
					"Similarity search did not finish within {} ms.",
					limit.as_millis()
				),
			}),
		}
	}

	async fn similarity(
		&self,
		filter: &ChunkFilter,
		req: &ResolveRequest,
	) -> ServiceResult<ResolvedContext> {
		let query = req.query.trim();

		if query.is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "A query is required for similarity retrieval.".to_string(),
			});
		}

		let k = self.effective_top_k(req.top_k);
		let texts = [query.to_string()];
		let vector = self
			.providers
			.embedding
			.embed(&self.cfg.providers.embedding, &texts)
			.await?
			.into_iter()
			.next()
			.ok_or_else(|| ServiceError::Provider {
				message: "Embedding provider returned no vector for the query.".to_string(),
			})?;
		let chunks = self.backends.chunks.similarity_search(filter, &vector, k).await?;

		tracing::info!(k, returned = chunks.len(), "Resolved scope by similarity search.");

		if chunks.is_empty() {
			return Ok(ResolvedContext::Empty);
		}

		Ok(ResolvedContext::Chunks { chunks })
	}

	fn effective_top_k(&self, requested: Option<u32>) -> u32 {
		let retrieval = &self.cfg.retrieval;

		match requested {
			None | Some(0) => retrieval.default_top_k,
			Some(k) => k.min(retrieval.max_top_k),
		}
	}
}

/// Total token count, or `None` as soon as the running total passes `budget`.
fn count_within(
	counter: Arc<dyn TokenCounter>,
	texts: Vec<String>,
	budget: usize,
) -> ServiceResult<Option<usize>> {
	let mut total = 0_usize;

	for text in &texts {
		total = total.saturating_add(counter.count_tokens(text)?);

		if total > budget {
			return Ok(None);
		}
	}

	Ok(Some(total))
}

fn join_texts(chunks: &[ChunkRecord]) -> String {
	chunks.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>().join(ASSEMBLY_SEPARATOR)
}

fn doc_ids(chunks: &[ChunkRecord]) -> Vec<Uuid> {
	let mut ids: Vec<Uuid> = Vec::new();

	for chunk in chunks {
		if ids.last() != Some(&chunk.doc_id) {
			ids.push(chunk.doc_id);
		}
	}

	ids
}
