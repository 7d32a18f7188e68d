use serde::Serialize;
use uuid::Uuid;

use crate::{PerimeterService, ServiceError, ServiceResult, backends::missing_document, now};
use perimeter_domain::{
	Document, DocumentStatus, Job, JobType, NewDocument, Perimeter, SharedGroup,
	perimeter::normalize_token,
};

/// What a perimeter change did to the document's chunks.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PropagationOutcome {
	/// The perimeter already had the requested shape; no chunk was touched.
	Unchanged { perimeter: Perimeter },
	Indexed { perimeter: Perimeter, chunk_count: usize },
	/// The provider pushed back. The document stays `IN_PROGRESS` until `job_id` finishes.
	Processing { perimeter: Perimeter, job_id: Uuid },
}
impl PropagationOutcome {
	pub fn perimeter(&self) -> &Perimeter {
		match self {
			Self::Unchanged { perimeter }
			| Self::Indexed { perimeter, .. }
			| Self::Processing { perimeter, .. } => perimeter,
		}
	}

	pub fn is_processing(&self) -> bool {
		matches!(self, Self::Processing { .. })
	}
}

#[derive(Clone, Debug)]
pub struct UploadRequest {
	pub owner: String,
	pub name: String,
	pub content_type: String,
	pub content: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UploadedDocument {
	pub doc_id: Uuid,
	pub outcome: PropagationOutcome,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupDeletion {
	pub group_id: String,
	pub documents: Vec<(Uuid, PropagationOutcome)>,
}

impl PerimeterService {
	/// Stores a new document owned by `req.owner` and indexes it with the owner-only
	/// perimeter.
	pub async fn upload_document(&self, req: UploadRequest) -> ServiceResult<UploadedDocument> {
		let owner = normalize_token(&req.owner)?;
		let perimeter = Perimeter::owner(&owner)?;
		let doc = NewDocument {
			doc_id: Uuid::new_v4(),
			owner,
			name: req.name,
			content_type: req.content_type,
			perimeter: perimeter.clone(),
			content: req.content,
		};

		self.backends.documents.insert_document(&doc, now()).await?;

		tracing::info!(doc_id = %doc.doc_id, owner = %doc.owner, "Stored document.");

		let guard = self.lock_document(doc.doc_id).await?;
		let result = match self.require_document(doc.doc_id).await {
			Ok(stored) => self.reindex_locked(&stored, perimeter, 0).await,
			Err(err) => Err(err),
		};

		guard.release().await;

		Ok(UploadedDocument { doc_id: doc.doc_id, outcome: result? })
	}

	/// Removes the document together with all of its chunks.
	pub async fn delete_document(&self, doc_id: Uuid) -> ServiceResult<u64> {
		let guard = self.lock_document(doc_id).await?;
		let result = self.delete_document_locked(doc_id).await;

		guard.release().await;

		result
	}

	/// Rebuilds every chunk of the document under `perimeter`, even when the perimeter is
	/// unchanged.
	pub async fn reindex(
		&self,
		doc_id: Uuid,
		perimeter: Perimeter,
	) -> ServiceResult<PropagationOutcome> {
		if perimeter.is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "Perimeter must contain at least one token.".to_string(),
			});
		}

		let guard = self.lock_document(doc_id).await?;
		let result = match self.require_document(doc_id).await {
			Ok(doc) => self.reindex_locked(&doc, perimeter, 0).await,
			Err(err) => Err(err),
		};

		guard.release().await;

		result
	}

	/// Adds `group_id` to the document's perimeter. Sharing with a group that already has
	/// access leaves the chunks alone.
	pub async fn share(&self, doc_id: Uuid, group_id: &str) -> ServiceResult<PropagationOutcome> {
		let token = normalize_token(group_id)?;
		let guard = self.lock_document(doc_id).await?;
		let result = self.share_locked(doc_id, &token).await;

		guard.release().await;

		result
	}

	/// Removes `group_id` from the document's perimeter. Chunks stamped with the old perimeter
	/// are deleted before the new ones are written, so revoked readers lose access even when
	/// re-embedding is deferred.
	pub async fn unshare(&self, doc_id: Uuid, group_id: &str) -> ServiceResult<PropagationOutcome> {
		let token = normalize_token(group_id)?;
		let guard = self.lock_document(doc_id).await?;
		let result = self.unshare_locked(doc_id, &token).await;

		guard.release().await;

		result
	}

	pub async fn create_group(
		&self,
		group_id: &str,
		name: &str,
		owner: &str,
	) -> ServiceResult<SharedGroup> {
		let group_id = normalize_token(group_id)?;

		if self.backends.groups.get_group(&group_id).await?.is_some() {
			return Err(ServiceError::Conflict {
				message: format!("Group {group_id} already exists."),
			});
		}

		let group = SharedGroup {
			group_id,
			name: name.to_string(),
			owner: normalize_token(owner)?,
			created_at: now(),
		};

		self.backends.groups.create_group(&group).await?;

		tracing::info!(group_id = %group.group_id, owner = %group.owner, "Created group.");

		Ok(group)
	}

	/// Unshares every member document before the group record goes away. Documents stamped
	/// with the group token before the group was registered are unshared too. The first
	/// failing document aborts the deletion and leaves the group in place.
	pub async fn delete_group(&self, group_id: &str) -> ServiceResult<GroupDeletion> {
		let group_id = normalize_token(group_id)?;

		if self.backends.groups.get_group(&group_id).await?.is_none() {
			return Err(ServiceError::NotFound {
				message: format!("Group {group_id} does not exist."),
			});
		}

		let mut members = self.backends.groups.list_documents(&group_id).await?;

		for doc_id in self.backends.documents.list_with_token(&group_id).await? {
			if !members.contains(&doc_id) {
				members.push(doc_id);
			}
		}

		let mut documents = Vec::with_capacity(members.len());

		for doc_id in members {
			match self.unshare(doc_id, &group_id).await {
				Ok(outcome) => documents.push((doc_id, outcome)),
				Err(ServiceError::NotFound { .. }) => {
					tracing::debug!(%doc_id, %group_id, "Skipping deleted group member.");
				},
				Err(err) => {
					tracing::error!(
						error = %err,
						%doc_id,
						%group_id,
						"Group deletion stopped at a member document."
					);

					return Err(err);
				},
			}
		}

		self.backends.groups.delete_group(&group_id).await?;

		tracing::info!(%group_id, documents = documents.len(), "Deleted group.");

		Ok(GroupDeletion { group_id, documents })
	}

	pub(crate) async fn require_document(&self, doc_id: Uuid) -> ServiceResult<Document> {
		self.backends.documents.get_document(doc_id).await?.ok_or_else(|| missing_document(doc_id))
	}

	/// Caller must hold the document lock. `prior_attempts` counts the earlier attempts that
	/// ended in a rate limit.
	pub(crate) async fn reindex_locked(
		&self,
		doc: &Document,
		perimeter: Perimeter,
		prior_attempts: i32,
	) -> ServiceResult<PropagationOutcome> {
		let doc_id = doc.doc_id;
		let content = self
			.backends
			.documents
			.get_raw_content(doc_id)
			.await?
			.ok_or_else(|| missing_document(doc_id))?;

		tracing::info!(
			%doc_id,
			from = %doc.perimeter,
			to = %perimeter,
			"Recomputed document perimeter."
		);

		self.backends.documents.set_status(doc_id, DocumentStatus::InProgress, now()).await?;

		match self.rebuild_chunks(doc, &perimeter, &content).await {
			Ok(chunk_count) => {
				self.backends.documents.set_status(doc_id, DocumentStatus::Completed, now()).await?;

				tracing::info!(%doc_id, chunk_count, "Reindexed document.");

				Ok(PropagationOutcome::Indexed { perimeter, chunk_count })
			},
			Err(ServiceError::RateLimited { message, retry_after_ms }) =>
				self.defer_reindex(doc_id, perimeter, prior_attempts, message, retry_after_ms).await,
			Err(err) => {
				self.mark_failed(doc_id, &err).await;

				Err(err)
			},
		}
	}

	async fn rebuild_chunks(
		&self,
		doc: &Document,
		perimeter: &Perimeter,
		content: &str,
	) -> ServiceResult<usize> {
		let removed = self.backends.chunks.delete_where(doc.doc_id).await?;

		tracing::debug!(doc_id = %doc.doc_id, removed, "Removed chunks before reindexing.");

		self.backends.documents.set_perimeter(doc.doc_id, perimeter, now()).await?;
		self.index_locked(doc.doc_id, &doc.owner, perimeter, content).await
	}

	async fn defer_reindex(
		&self,
		doc_id: Uuid,
		perimeter: Perimeter,
		prior_attempts: i32,
		message: String,
		retry_after_ms: Option<u64>,
	) -> ServiceResult<PropagationOutcome> {
		let attempts = prior_attempts.saturating_add(1);
		let max_attempts = i32::try_from(self.cfg.worker.max_attempts).unwrap_or(i32::MAX);

		// Only a job gives up. The first rate limit always leaves a job behind.
		if prior_attempts > 0 && attempts >= max_attempts {
			let err = ServiceError::RateLimited {
				message: format!("{message} Gave up after {attempts} attempts."),
				retry_after_ms,
			};

			self.mark_failed(doc_id, &err).await;

			return Err(err);
		}

		let now = now();
		let mut job = Job::new(doc_id, perimeter.clone(), JobType::ReEmbed, now);

		job.attempts = attempts;
		job.last_error = Some(message);
		job.available_at =
			now + crate::jobs::retry_delay(&self.cfg.worker, attempts, retry_after_ms);

		if let Err(err) = self.backends.jobs.save(&job).await {
			self.mark_failed(doc_id, &err).await;

			return Err(err);
		}

		tracing::warn!(
			%doc_id,
			job_id = %job.job_id,
			attempts,
			available_at = %job.available_at,
			"Provider rate limited reindexing. Deferred to a job."
		);

		Ok(PropagationOutcome::Processing { perimeter, job_id: job.job_id })
	}

	async fn mark_failed(&self, doc_id: Uuid, cause: &ServiceError) {
		tracing::error!(error = %cause, %doc_id, "Document indexing failed.");

		if let Err(err) =
			self.backends.documents.set_status(doc_id, DocumentStatus::Failed, now()).await
		{
			tracing::error!(error = %err, %doc_id, "Failed to mark document as failed.");
		}
	}

	async fn share_locked(&self, doc_id: Uuid, token: &str) -> ServiceResult<PropagationOutcome> {
		let doc = self.require_document(doc_id).await?;

		if self.backends.groups.get_group(token).await?.is_some() {
			self.backends.groups.add_document(token, doc_id, now()).await?;
		}

		let next = doc.perimeter.with(token)?;

		if next == doc.perimeter {
			tracing::debug!(%doc_id, token, "Document is already shared with token.");

			return Ok(PropagationOutcome::Unchanged { perimeter: next });
		}

		self.reindex_locked(&doc, next, 0).await
	}

	async fn unshare_locked(&self, doc_id: Uuid, token: &str) -> ServiceResult<PropagationOutcome> {
		let doc = self.require_document(doc_id).await?;

		if doc.owner == token {
			return Err(ServiceError::InvalidRequest {
				message: "The owner token cannot be removed from a perimeter.".to_string(),
			});
		}

		self.backends.groups.remove_document(token, doc_id).await?;

		let next = doc.perimeter.without(token)?;

		if next == doc.perimeter {
			tracing::debug!(%doc_id, token, "Document is not shared with token.");

			return Ok(PropagationOutcome::Unchanged { perimeter: next });
		}

		self.reindex_locked(&doc, next, 0).await
	}

	async fn delete_document_locked(&self, doc_id: Uuid) -> ServiceResult<u64> {
		self.require_document(doc_id).await?;

		let removed = self.backends.chunks.delete_where(doc_id).await?;

		self.backends.documents.delete_document(doc_id).await?;

		tracing::info!(%doc_id, removed, "Deleted document.");

		Ok(removed)
	}
}
