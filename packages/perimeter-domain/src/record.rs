use time::OffsetDateTime;
use uuid::Uuid;

use crate::{DocumentStatus, JobStatus, JobType, Perimeter};

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
	pub doc_id: Uuid,
	pub owner: String,
	pub name: String,
	pub content_type: String,
	pub perimeter: Perimeter,
	pub status: DocumentStatus,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct NewDocument {
	pub doc_id: Uuid,
	pub owner: String,
	pub name: String,
	pub content_type: String,
	pub perimeter: Perimeter,
	pub content: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SharedGroup {
	pub group_id: String,
	pub name: String,
	pub owner: String,
	pub created_at: OffsetDateTime,
}

/// Durable record of deferred indexing work. Jobs reach a terminal status and are kept as an
/// audit trail.
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
	pub job_id: Uuid,
	pub doc_id: Uuid,
	pub perimeter: Perimeter,
	pub job_type: JobType,
	pub status: JobStatus,
	pub attempts: i32,
	pub last_error: Option<String>,
	/// Workers leave the job alone until this instant.
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl Job {
	pub fn new(doc_id: Uuid, perimeter: Perimeter, job_type: JobType, now: OffsetDateTime) -> Self {
		Self {
			job_id: Uuid::new_v4(),
			doc_id,
			perimeter,
			job_type,
			status: JobStatus::Requested,
			attempts: 0,
			last_error: None,
			available_at: now,
			created_at: now,
			updated_at: now,
		}
	}

	pub fn is_available(&self, now: OffsetDateTime) -> bool {
		self.status == JobStatus::Requested && self.available_at <= now
	}
}
