pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Config(#[from] perimeter_config::Error),
	#[error(transparent)]
	Storage(#[from] perimeter_storage::Error),
	#[error(transparent)]
	Tokenizer(#[from] perimeter_chunking::Error),
	#[error(transparent)]
	Service(#[from] perimeter_service::ServiceError),
}
