pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid perimeter token {token:?}: {reason}.")]
	InvalidToken { token: String, reason: &'static str },
	#[error("Unknown status {0:?}.")]
	InvalidStatus(String),
	#[error("Unknown job type {0:?}.")]
	InvalidJobType(String),
	#[error("Illegal status transition from {from} to {to}.")]
	InvalidTransition { from: &'static str, to: &'static str },
}
