mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Chunking, Config, EmbeddingProviderConfig, Postgres, Propagation, Providers, Qdrant,
	Retrieval, Service, Storage, Worker,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.timeout_ms must be greater than zero.".to_string(),
		});
	}

	let embedding = &cfg.providers.embedding;

	if embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.api_key must be non-empty.".to_string(),
		});
	}
	if embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if embedding.batch_size == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.batch_size must be greater than zero.".to_string(),
		});
	}
	if embedding.default_headers.values().any(|value| !value.is_string()) {
		return Err(Error::Validation {
			message: "providers.embedding.default_headers values must be strings.".to_string(),
		});
	}
	if cfg.chunking.max_tokens == 0 {
		return Err(Error::Validation {
			message: "chunking.max_tokens must be greater than zero.".to_string(),
		});
	}
	if cfg.chunking.overlap_tokens >= cfg.chunking.max_tokens {
		return Err(Error::Validation {
			message: "chunking.overlap_tokens must be less than chunking.max_tokens.".to_string(),
		});
	}
	if cfg.chunking.max_chunks_per_doc == 0 {
		return Err(Error::Validation {
			message: "chunking.max_chunks_per_doc must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.token_budget == 0 {
		return Err(Error::Validation {
			message: "retrieval.token_budget must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.default_top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.default_top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.max_top_k < cfg.retrieval.default_top_k {
		return Err(Error::Validation {
			message: "retrieval.max_top_k must be at least retrieval.default_top_k.".to_string(),
		});
	}
	if cfg.retrieval.search_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "retrieval.search_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "worker.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.max_backoff_ms < cfg.worker.base_backoff_ms {
		return Err(Error::Validation {
			message: "worker.max_backoff_ms must be at least worker.base_backoff_ms.".to_string(),
		});
	}
	if cfg.worker.max_attempts == 0 {
		return Err(Error::Validation {
			message: "worker.max_attempts must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

/// Resolves the tokenizer used for both chunking and direct-assembly token counting.
pub fn tokenizer_repo(cfg: &Config) -> &str {
	cfg.chunking.tokenizer_repo.as_deref().unwrap_or(cfg.providers.embedding.model.as_str())
}

fn normalize(cfg: &mut Config) {
	if cfg.chunking.tokenizer_repo.as_deref().map(|repo| repo.trim().is_empty()).unwrap_or(false) {
		cfg.chunking.tokenizer_repo = None;
	}

	let api_base = cfg.providers.embedding.api_base.trim_end_matches('/').to_string();

	cfg.providers.embedding.api_base = api_base;
}
