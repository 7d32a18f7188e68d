use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub chunking: Chunking,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub propagation: Propagation,
	#[serde(default)]
	pub worker: Worker,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
	#[serde(default = "default_qdrant_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	/// Maximum number of texts sent in one embedding request.
	#[serde(default = "default_embedding_batch_size")]
	pub batch_size: u32,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chunking {
	#[serde(default = "default_max_tokens")]
	pub max_tokens: u32,
	#[serde(default = "default_overlap_tokens")]
	pub overlap_tokens: u32,
	#[serde(default = "default_max_chunks_per_doc")]
	pub max_chunks_per_doc: u32,
	/// Falls back to `providers.embedding.model` when unset.
	pub tokenizer_repo: Option<String>,
}
impl Default for Chunking {
	fn default() -> Self {
		Self {
			max_tokens: default_max_tokens(),
			overlap_tokens: default_overlap_tokens(),
			max_chunks_per_doc: default_max_chunks_per_doc(),
			tokenizer_repo: None,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Retrieval {
	/// Upper bound, in tokenizer units, for returning a document set as raw text.
	#[serde(default = "default_token_budget")]
	pub token_budget: u32,
	#[serde(default = "default_top_k")]
	pub default_top_k: u32,
	#[serde(default = "default_max_top_k")]
	pub max_top_k: u32,
	#[serde(default = "default_search_timeout_ms")]
	pub search_timeout_ms: u64,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self {
			token_budget: default_token_budget(),
			default_top_k: default_top_k(),
			max_top_k: default_max_top_k(),
			search_timeout_ms: default_search_timeout_ms(),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Propagation {
	#[serde(default = "default_lock_wait_ms")]
	pub lock_wait_ms: u64,
}
impl Default for Propagation {
	fn default() -> Self {
		Self { lock_wait_ms: default_lock_wait_ms() }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Worker {
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default = "default_base_backoff_ms")]
	pub base_backoff_ms: u64,
	#[serde(default = "default_max_backoff_ms")]
	pub max_backoff_ms: u64,
	/// Attempts after which a rate-limited document is marked failed instead of re-queued.
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
}
impl Default for Worker {
	fn default() -> Self {
		Self {
			poll_interval_ms: default_poll_interval_ms(),
			base_backoff_ms: default_base_backoff_ms(),
			max_backoff_ms: default_max_backoff_ms(),
			max_attempts: default_max_attempts(),
		}
	}
}

fn default_qdrant_timeout_ms() -> u64 {
	10_000
}

fn default_embedding_batch_size() -> u32 {
	64
}

fn default_max_tokens() -> u32 {
	1_024
}

fn default_overlap_tokens() -> u32 {
	200
}

fn default_max_chunks_per_doc() -> u32 {
	4_096
}

fn default_token_budget() -> u32 {
	16_384
}

fn default_top_k() -> u32 {
	10
}

fn default_max_top_k() -> u32 {
	100
}

fn default_search_timeout_ms() -> u64 {
	5_000
}

fn default_lock_wait_ms() -> u64 {
	2_000
}

fn default_poll_interval_ms() -> u64 {
	500
}

fn default_base_backoff_ms() -> u64 {
	500
}

fn default_max_backoff_ms() -> u64 {
	30_000
}

fn default_max_attempts() -> u32 {
	5
}
