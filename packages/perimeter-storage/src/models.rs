use time::OffsetDateTime;
use uuid::Uuid;

use perimeter_domain::{Document, Job, Perimeter, SharedGroup};

use crate::{Error, Result};

#[derive(Debug, sqlx::FromRow)]
pub struct DocumentRow {
	pub doc_id: Uuid,
	pub owner: String,
	pub name: String,
	pub content_type: String,
	pub perimeter: String,
	pub status: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl TryFrom<DocumentRow> for Document {
	type Error = Error;

	fn try_from(row: DocumentRow) -> Result<Self> {
		Ok(Self {
			doc_id: row.doc_id,
			owner: row.owner,
			name: row.name,
			content_type: row.content_type,
			perimeter: Perimeter::parse(&row.perimeter),
			status: row.status.parse()?,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct SharedGroupRow {
	pub group_id: String,
	pub name: String,
	pub owner: String,
	pub created_at: OffsetDateTime,
}
impl From<SharedGroupRow> for SharedGroup {
	fn from(row: SharedGroupRow) -> Self {
		Self {
			group_id: row.group_id,
			name: row.name,
			owner: row.owner,
			created_at: row.created_at,
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct JobRow {
	pub job_id: Uuid,
	pub doc_id: Uuid,
	pub perimeter: String,
	pub job_type: String,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl TryFrom<JobRow> for Job {
	type Error = Error;

	fn try_from(row: JobRow) -> Result<Self> {
		Ok(Self {
			job_id: row.job_id,
			doc_id: row.doc_id,
			perimeter: Perimeter::parse(&row.perimeter),
			job_type: row.job_type.parse()?,
			status: row.status.parse()?,
			attempts: row.attempts,
			last_error: row.last_error,
			available_at: row.available_at,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}
