pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	/// Provider backpressure. The indexing callers turn this into a job.
	#[error("Rate limited: {message}")]
	RateLimited { message: String, retry_after_ms: Option<u64> },
	#[error("Indexing failed: {message}")]
	IndexingFailed { message: String },
	#[error("Tokenization failed: {message}")]
	TokenizationFailed { message: String },
	#[error("Concurrency conflict: {message}")]
	ConcurrencyConflict { message: String },
	#[error("Deadline exceeded: {message}")]
	DeadlineExceeded { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
}
impl From<sqlx::Error> for ServiceError {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<perimeter_storage::Error> for ServiceError {
	fn from(err: perimeter_storage::Error) -> Self {
		match err {
			perimeter_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			perimeter_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			perimeter_storage::Error::NotFound(message) => Self::NotFound { message },
			perimeter_storage::Error::Conflict(message) => Self::Conflict { message },
			perimeter_storage::Error::InvalidPayload(message) => Self::Qdrant { message },
			perimeter_storage::Error::Domain(inner) => Self::Storage { message: inner.to_string() },
			perimeter_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}
impl From<perimeter_providers::Error> for ServiceError {
	fn from(err: perimeter_providers::Error) -> Self {
		match err {
			perimeter_providers::Error::RateLimited { retry_after_ms } =>
				Self::RateLimited { message: err.to_string(), retry_after_ms },
			other => Self::Provider { message: other.to_string() },
		}
	}
}
impl From<perimeter_chunking::Error> for ServiceError {
	fn from(err: perimeter_chunking::Error) -> Self {
		Self::TokenizationFailed { message: err.to_string() }
	}
}
impl From<perimeter_domain::Error> for ServiceError {
	fn from(err: perimeter_domain::Error) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}
