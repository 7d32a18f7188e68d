use std::{
	hash::{DefaultHasher, Hash, Hasher},
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use ahash::AHashMap;
use tokenizers::{Tokenizer, models::wordlevel::WordLevel, pre_tokenizers::whitespace::Whitespace};

use perimeter_chunking::TokenCounter;
use perimeter_config::EmbeddingProviderConfig;
use perimeter_service::{BoxFuture, EmbeddingProvider};

/// One token per word or punctuation run; every token maps to `<unk>`.
pub fn word_tokenizer() -> Tokenizer {
	let mut vocab = AHashMap::new();

	vocab.insert("<unk>".to_string(), 0);

	let model = WordLevel::builder()
		.vocab(vocab)
		.unk_token("<unk>".to_string())
		.build()
		.expect("Failed to build word-level model.");
	let mut tokenizer = Tokenizer::new(model);

	tokenizer.with_pre_tokenizer(Some(Whitespace));

	tokenizer
}

/// Bag-of-words hashing embedder. Texts sharing words point in similar directions, so
/// similarity search behaves predictably without a model.
pub struct StubEmbedding {
	dimensions: usize,
	calls: AtomicUsize,
	rate_limited_calls: AtomicUsize,
	embedded: Mutex<Vec<String>>,
}
impl StubEmbedding {
	pub fn new(dimensions: u32) -> Self {
		Self {
			dimensions: dimensions as usize,
			calls: AtomicUsize::new(0),
			rate_limited_calls: AtomicUsize::new(0),
			embedded: Mutex::new(Vec::new()),
		}
	}

	/// The next `count` calls answer with a rate limit.
	pub fn rate_limit_next(&self, count: usize) {
		self.rate_limited_calls.store(count, Ordering::SeqCst);
	}

	/// Calls made, including rate-limited ones.
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn embedded_texts(&self) -> Vec<String> {
		self.embedded.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn vector_for(&self, text: &str) -> Vec<f32> {
		let mut vector = vec![0.0_f32; self.dimensions.max(1)];

		for word in text.split_whitespace() {
			let mut hasher = DefaultHasher::new();

			word.to_lowercase().hash(&mut hasher);

			let slot = (hasher.finish() % vector.len() as u64) as usize;

			vector[slot] += 1.0;
		}

		vector
	}

	fn take_rate_limit(&self) -> bool {
		self.rate_limited_calls
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
			.is_ok()
	}
}
impl EmbeddingProvider for StubEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, perimeter_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			if self.take_rate_limit() {
				return Err(perimeter_providers::Error::RateLimited { retry_after_ms: None });
			}

			let mut embedded = self.embedded.lock().unwrap_or_else(|err| err.into_inner());

			embedded.extend(texts.iter().cloned());
			drop(embedded);

			Ok(texts.iter().map(|text| self.vector_for(text)).collect())
		})
	}
}

pub struct FailingTokenCounter;
impl TokenCounter for FailingTokenCounter {
	fn count_tokens(&self, _text: &str) -> perimeter_chunking::Result<usize> {
		Err(perimeter_chunking::Error::Tokenizer { message: "tokenizer unavailable".to_string() })
	}
}
