use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
	Requested,
	/// Chunk-less or being re-indexed. Read paths treat it as temporarily unavailable.
	InProgress,
	Completed,
	Failed,
}
impl DocumentStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Requested => "REQUESTED",
			Self::InProgress => "IN_PROGRESS",
			Self::Completed => "COMPLETED",
			Self::Failed => "FAILED",
		}
	}
}
impl FromStr for DocumentStatus {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw {
			"REQUESTED" => Ok(Self::Requested),
			"IN_PROGRESS" => Ok(Self::InProgress),
			"COMPLETED" => Ok(Self::Completed),
			"FAILED" => Ok(Self::Failed),
			_ => Err(Error::InvalidStatus(raw.to_string())),
		}
	}
}
impl fmt::Display for DocumentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
	Requested,
	InProgress,
	Completed,
	Failed,
}
impl JobStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Requested => "REQUESTED",
			Self::InProgress => "IN_PROGRESS",
			Self::Completed => "COMPLETED",
			Self::Failed => "FAILED",
		}
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Completed | Self::Failed)
	}

	/// `REQUESTED -> IN_PROGRESS -> COMPLETED | FAILED`. Terminal states never move again.
	pub fn can_transition_to(self, next: Self) -> bool {
		matches!(
			(self, next),
			(Self::Requested, Self::InProgress)
				| (Self::InProgress, Self::Completed)
				| (Self::InProgress, Self::Failed)
		)
	}

	pub fn transition(self, next: Self) -> Result<Self> {
		if self.can_transition_to(next) {
			Ok(next)
		} else {
			Err(Error::InvalidTransition { from: self.as_str(), to: next.as_str() })
		}
	}
}
impl FromStr for JobStatus {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw {
			"REQUESTED" => Ok(Self::Requested),
			"IN_PROGRESS" => Ok(Self::InProgress),
			"COMPLETED" => Ok(Self::Completed),
			"FAILED" => Ok(Self::Failed),
			_ => Err(Error::InvalidStatus(raw.to_string())),
		}
	}
}
impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
	/// Rebuild chunks with the document's current perimeter after a rate-limited attempt.
	ReEmbed,
	/// Apply the job's target perimeter, then rebuild chunks.
	SharePropagate,
}
impl JobType {
	pub const ALL: [Self; 2] = [Self::ReEmbed, Self::SharePropagate];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::ReEmbed => "re-embed",
			Self::SharePropagate => "share-propagate",
		}
	}
}
impl FromStr for JobType {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw {
			"re-embed" => Ok(Self::ReEmbed),
			"share-propagate" => Ok(Self::SharePropagate),
			_ => Err(Error::InvalidJobType(raw.to_string())),
		}
	}
}
impl fmt::Display for JobType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
