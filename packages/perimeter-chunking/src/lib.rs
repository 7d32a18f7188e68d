pub use tokenizers::Tokenizer;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Tokenizer failed: {message}")]
	Tokenizer { message: String },
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("Document exceeds {max_chunks} chunks.")]
	TooManyChunks { max_chunks: usize },
	#[error("Chunk offsets {start}..{end} do not fall on UTF-8 boundaries.")]
	InvalidOffset { start: usize, end: usize },
}

#[derive(Clone, Debug)]
pub struct ChunkingConfig {
	pub max_tokens: u32,
	pub overlap_tokens: u32,
	pub max_chunks: u32,
}
impl ChunkingConfig {
	pub fn validate(&self) -> Result<()> {
		if self.max_tokens == 0 {
			return Err(Error::InvalidConfig {
				message: "max_tokens must be greater than zero.".to_string(),
			});
		}
		if self.overlap_tokens >= self.max_tokens {
			return Err(Error::InvalidConfig {
				message: "overlap_tokens must be less than max_tokens.".to_string(),
			});
		}

		Ok(())
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
	pub chunk_index: i32,
	/// Byte offsets into the source text.
	pub start_offset: usize,
	pub end_offset: usize,
	pub text: String,
}

/// Canonical token counting used to enforce retrieval budgets.
pub trait TokenCounter
where
	Self: Send + Sync,
{
	fn count_tokens(&self, text: &str) -> Result<usize>;
}
impl TokenCounter for Tokenizer {
	fn count_tokens(&self, text: &str) -> Result<usize> {
		let encoding = self
			.encode(text, false)
			.map_err(|err| Error::Tokenizer { message: err.to_string() })?;

		Ok(encoding.len())
	}
}

pub fn load_tokenizer(repo: &str) -> Result<Tokenizer> {
	Tokenizer::from_pretrained(repo, None).map_err(|err| Error::Tokenizer {
		message: format!("failed to load tokenizer {repo:?}: {err}"),
	})
}

/// Splits `text` into windows of at most `max_tokens` tokens, each window starting
/// `overlap_tokens` before the previous one ended. Window text is sliced from the source, so
/// stored chunks always reproduce the original bytes of their range.
pub fn split_text(text: &str, cfg: &ChunkingConfig, tokenizer: &Tokenizer) -> Result<Vec<Chunk>> {
	cfg.validate()?;

	let encoding = tokenizer
		.encode(text, false)
		.map_err(|err| Error::Tokenizer { message: err.to_string() })?;
	let offsets = encoding.get_offsets();

	if offsets.is_empty() {
		return Ok(Vec::new());
	}

	let max_tokens = cfg.max_tokens as usize;
	let overlap_tokens = cfg.overlap_tokens as usize;
	let max_chunks = cfg.max_chunks as usize;
	let mut chunks = Vec::new();
	let mut chunk_start_token = 0_usize;

	while chunk_start_token < offsets.len() {
		if chunks.len() >= max_chunks {
			return Err(Error::TooManyChunks { max_chunks });
		}

		let chunk_end_token = (chunk_start_token + max_tokens).min(offsets.len());
		let (start, _) = offsets[chunk_start_token];
		let (_, end) = offsets[chunk_end_token - 1];
		let chunk_text = text.get(start..end).ok_or(Error::InvalidOffset { start, end })?;

		chunks.push(Chunk {
			chunk_index: chunks.len() as i32,
			start_offset: start,
			end_offset: end,
			text: chunk_text.to_string(),
		});

		if chunk_end_token >= offsets.len() {
			break;
		}

		chunk_start_token = chunk_end_token - overlap_tokens;
	}

	tracing::trace!(chunk_count = chunks.len(), token_count = offsets.len(), "Split text.");

	Ok(chunks)
}
