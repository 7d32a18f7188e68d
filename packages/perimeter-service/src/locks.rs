use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
	time::Duration,
};

use tokio::{
	sync::{Mutex as AsyncMutex, OwnedMutexGuard},
	time::{self, Instant},
};
use uuid::Uuid;

use crate::{BoxFuture, DocumentLocks, ServiceError, ServiceResult};
use perimeter_storage::db::{Db, DocumentLease};

const ADVISORY_RETRY_INTERVAL: Duration = Duration::from_millis(50);

type LockTable = Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>;

/// Proof that the holder is the only writer for `doc_id`. Dropping the guard releases the
/// lock; `release` does the same but reports advisory unlock failures.
pub struct DocumentGuard {
	doc_id: Uuid,
	held: Held,
}
impl DocumentGuard {
	pub fn doc_id(&self) -> Uuid {
		self.doc_id
	}

	pub async fn release(self) {
		let doc_id = self.doc_id;

		match self.held {
			Held::Local(local) => drop(local),
			Held::Advisory(lease) =>
				if let Err(err) = lease.release().await {
					tracing::warn!(error = %err, %doc_id, "Failed to release document lock.");
				},
		}
	}
}

enum Held {
	Local(LocalHeld),
	Advisory(DocumentLease),
}

struct LocalHeld {
	doc_id: Uuid,
	table: Arc<LockTable>,
	guard: Option<OwnedMutexGuard<()>>,
}
impl Drop for LocalHeld {
	fn drop(&mut self) {
		drop(self.guard.take());

		let mut table = self.table.lock().unwrap_or_else(|err| err.into_inner());

		if table.get(&self.doc_id).is_some_and(|entry| Arc::strong_count(entry) == 1) {
			table.remove(&self.doc_id);
		}
	}
}

/// In-process lock table for single-node deployments and tests.
#[derive(Default)]
pub struct LocalDocumentLocks {
	table: Arc<LockTable>,
}
impl LocalDocumentLocks {
	pub fn new() -> Self {
		Self::default()
	}

	fn entry(&self, doc_id: Uuid) -> Arc<AsyncMutex<()>> {
		let mut table = self.table.lock().unwrap_or_else(|err| err.into_inner());

		table.entry(doc_id).or_default().clone()
	}
}
impl DocumentLocks for LocalDocumentLocks {
	fn acquire<'a>(
		&'a self,
		doc_id: Uuid,
		wait: Duration,
	) -> BoxFuture<'a, ServiceResult<DocumentGuard>> {
		Box::pin(async move {
			let mutex = self.entry(doc_id);
			let guard = time::timeout(wait, mutex.lock_owned()).await.ok();
			let held = LocalHeld { doc_id, table: self.table.clone(), guard };

			if held.guard.is_none() {
				drop(held);

				return Err(lock_conflict(doc_id, wait));
			}

			Ok(DocumentGuard { doc_id, held: Held::Local(held) })
		})
	}
}

/// Cross-process locks built on Postgres advisory locks.
impl DocumentLocks for Db {
	fn acquire<'a>(
		&'a self,
		doc_id: Uuid,
		wait: Duration,
	) -> BoxFuture<'a, ServiceResult<DocumentGuard>> {
		Box::pin(async move {
			let deadline = Instant::now() + wait;

			loop {
				let remaining = deadline.saturating_duration_since(Instant::now());
				let Ok(attempt) = time::timeout(remaining, self.try_lock_document(doc_id)).await
				else {
					return Err(lock_conflict(doc_id, wait));
				};

				if let Some(lease) = attempt? {
					return Ok(DocumentGuard { doc_id, held: Held::Advisory(lease) });
				}

				let now = Instant::now();

				if now >= deadline {
					return Err(lock_conflict(doc_id, wait));
				}

				time::sleep(ADVISORY_RETRY_INTERVAL.min(deadline - now)).await;
			}
		})
	}
}

fn lock_conflict(doc_id: Uuid, wait: Duration) -> ServiceError {
	tracing::warn!(%doc_id, wait_ms = wait.as_millis() as u64, "Document lock wait timed out.");

	ServiceError::ConcurrencyConflict {
		message: format!("Document {doc_id} is locked by another writer."),
	}
}
