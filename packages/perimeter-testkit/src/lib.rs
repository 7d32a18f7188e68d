//! Fixtures for perimeter tests: in-memory backends, deterministic providers, and disposable
//! Postgres databases for the live suites.

pub mod live;
pub mod memory;
pub mod providers;

mod error;

pub use error::{Error, Result};
pub use live::{TestDatabase, env_dsn, env_qdrant_url};
pub use memory::{MemoryBackends, MemoryChunks, MemoryDocuments, MemoryJobs};
pub use providers::{FailingTokenCounter, StubEmbedding, word_tokenizer};

use serde_json::Map;

use perimeter_config::{
	Chunking, Config, EmbeddingProviderConfig, Postgres, Propagation, Providers, Qdrant,
	Retrieval, Service, Storage, Worker,
};

pub const TEST_VECTOR_DIM: u32 = 16;

/// Small windows so short test documents span several chunks.
pub fn test_config() -> Config {
	Config {
		service: Service { log_level: "debug".to_string() },
		storage: Storage {
			postgres: Postgres {
				dsn: "postgres://localhost/perimeter_test".to_string(),
				pool_max_conns: 4,
			},
			qdrant: Qdrant {
				url: "http://127.0.0.1:6334".to_string(),
				collection: "perimeter_chunks_test".to_string(),
				vector_dim: TEST_VECTOR_DIM,
				timeout_ms: 5_000,
			},
		},
		providers: Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "stub".to_string(),
				api_base: "http://127.0.0.1:9".to_string(),
				api_key: "test".to_string(),
				path: "/embeddings".to_string(),
				model: "stub-embedding".to_string(),
				dimensions: TEST_VECTOR_DIM,
				timeout_ms: 1_000,
				batch_size: 8,
				default_headers: Map::new(),
			},
		},
		chunking: Chunking {
			max_tokens: 8,
			overlap_tokens: 2,
			max_chunks_per_doc: 256,
			tokenizer_repo: None,
		},
		retrieval: Retrieval {
			token_budget: 64,
			default_top_k: 3,
			max_top_k: 5,
			search_timeout_ms: 2_000,
		},
		propagation: Propagation { lock_wait_ms: 200 },
		worker: Worker {
			poll_interval_ms: 10,
			base_backoff_ms: 0,
			max_backoff_ms: 0,
			max_attempts: 3,
		},
	}
}
