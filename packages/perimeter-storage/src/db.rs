use sqlx::{PgPool, Postgres, Transaction, postgres::PgPoolOptions};
use uuid::Uuid;

use crate::{Result, schema};

const SCHEMA_LOCK_ID: i64 = 7_120_115;
const DOCUMENT_LOCK_NAMESPACE: i32 = 7_120;

pub struct Db {
	pub pool: PgPool,
	/// Holds document leases only. Work done under a lease goes through `pool`.
	lock_pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &perimeter_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;
		let lock_pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool, lock_pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = schema::render_schema();
		// Advisory locks are held per connection. Use a single transaction so the lock is scoped to
		// one connection and automatically released when the transaction ends.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)")
			.bind(SCHEMA_LOCK_ID)
			.execute(&mut *tx)
			.await?;

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}

	/// Tries once to take the cross-process write lock for a document. The lock lives as long
	/// as the returned lease's transaction; dropping the lease rolls it back and frees the lock.
	pub async fn try_lock_document(&self, doc_id: Uuid) -> Result<Option<DocumentLease>> {
		let mut tx = self.lock_pool.begin().await?;
		let (locked,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_xact_lock($1, $2)")
			.bind(DOCUMENT_LOCK_NAMESPACE)
			.bind(document_lock_key(doc_id))
			.fetch_one(&mut *tx)
			.await?;

		if !locked {
			tx.rollback().await?;

			return Ok(None);
		}

		Ok(Some(DocumentLease { tx }))
	}
}

pub struct DocumentLease {
	tx: Transaction<'static, Postgres>,
}
impl DocumentLease {
	pub async fn release(self) -> Result<()> {
		self.tx.commit().await?;

		Ok(())
	}
}

/// Folds the id into the 32-bit key space of the two-key advisory lock. Collisions only cause
/// extra contention, never a missed lock.
pub fn document_lock_key(doc_id: Uuid) -> i32 {
	let value = doc_id.as_u128();
	let folded =
		[0, 32, 64, 96].into_iter().fold(0_u32, |acc, shift| acc ^ (value >> shift) as u32);

	folded as i32
}
