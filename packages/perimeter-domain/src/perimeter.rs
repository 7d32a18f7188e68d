//! Access-scope tokens attached to a document and stamped into every chunk of it.
//!
//! Tokens are stored bare (`group7`) and rendered delimited (`/group7/`). Every match against a
//! chunk uses the delimited form, so `/group1/` can never match inside `/group10/`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const TOKEN_DELIMITER: char = '/';

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Perimeter {
	tokens: Vec<String>,
}
impl Perimeter {
	/// The perimeter of a freshly uploaded document: visible to its owner only.
	pub fn owner(owner: &str) -> Result<Self> {
		let token = normalize_token(owner)?;

		Ok(Self { tokens: vec![token] })
	}

	/// Accepts both the delimited form (`/owner1/ /group7/`) and the legacy space or slash
	/// separated form (`group7  owner1`, `owner1/group7`). Duplicates collapse to the first
	/// occurrence.
	pub fn parse(raw: &str) -> Self {
		let mut tokens: Vec<String> = Vec::new();

		for part in raw.split(|c: char| c.is_whitespace() || c == TOKEN_DELIMITER) {
			if part.is_empty() || tokens.iter().any(|token| token == part) {
				continue;
			}

			tokens.push(part.to_string());
		}

		Self { tokens }
	}

	pub fn contains(&self, token: &str) -> bool {
		match normalize_token(token) {
			Ok(token) => self.tokens.iter().any(|existing| *existing == token),
			Err(_) => false,
		}
	}

	/// Union with a single token. Adding a token that is already present returns an equal
	/// perimeter.
	pub fn with(&self, token: &str) -> Result<Self> {
		let token = normalize_token(token)?;
		let mut next = self.clone();

		if !next.tokens.contains(&token) {
			next.tokens.push(token);
		}

		Ok(next)
	}

	/// Difference with a single token. Removing an absent token returns an equal perimeter.
	pub fn without(&self, token: &str) -> Result<Self> {
		let token = normalize_token(token)?;
		let mut next = self.clone();

		next.tokens.retain(|existing| *existing != token);

		Ok(next)
	}

	pub fn tokens(&self) -> &[String] {
		&self.tokens
	}

	pub fn delimited_tokens(&self) -> Vec<String> {
		self.tokens.iter().map(|token| delimit(token)).collect()
	}

	pub fn is_empty(&self) -> bool {
		self.tokens.is_empty()
	}
}
impl fmt::Display for Perimeter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.delimited_tokens().join(" "))
	}
}
impl From<Perimeter> for String {
	fn from(perimeter: Perimeter) -> Self {
		perimeter.to_string()
	}
}
impl TryFrom<String> for Perimeter {
	type Error = Error;

	fn try_from(raw: String) -> Result<Self> {
		Ok(Self::parse(&raw))
	}
}

/// Trims a token and strips one pair of surrounding delimiters. A token may not be empty and may
/// not contain whitespace or the delimiter itself.
pub fn normalize_token(raw: &str) -> Result<String> {
	let trimmed = raw.trim();
	let bare = trimmed
		.strip_prefix(TOKEN_DELIMITER)
		.and_then(|rest| rest.strip_suffix(TOKEN_DELIMITER))
		.unwrap_or(trimmed);

	if bare.is_empty() {
		return Err(Error::InvalidToken { token: raw.to_string(), reason: "token is empty" });
	}
	if bare.chars().any(char::is_whitespace) {
		return Err(Error::InvalidToken {
			token: raw.to_string(),
			reason: "token contains whitespace",
		});
	}
	if bare.contains(TOKEN_DELIMITER) {
		return Err(Error::InvalidToken {
			token: raw.to_string(),
			reason: "token contains the delimiter",
		});
	}

	Ok(bare.to_string())
}

pub fn delimit(token: &str) -> String {
	format!("{TOKEN_DELIMITER}{token}{TOKEN_DELIMITER}")
}

/// Splits a caller's search scope on whitespace into delimited tokens. Malformed tokens are
/// dropped; they can never match a stamped perimeter.
pub fn scope_tokens(scope: &str) -> Vec<String> {
	let mut out: Vec<String> = Vec::new();

	for part in scope.split_whitespace() {
		let Ok(token) = normalize_token(part) else {
			continue;
		};
		let token = delimit(&token);

		if !out.contains(&token) {
			out.push(token);
		}
	}

	out
}
