use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use perimeter_domain::SharedGroup;

use crate::{Result, models::SharedGroupRow};

pub async fn insert_group<'e, E>(executor: E, group: &SharedGroup) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO shared_groups (group_id, name, owner, created_at)
VALUES ($1,$2,$3,$4)",
	)
	.bind(group.group_id.as_str())
	.bind(group.name.as_str())
	.bind(group.owner.as_str())
	.bind(group.created_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn fetch_group<'e, E>(executor: E, group_id: &str) -> Result<Option<SharedGroup>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, SharedGroupRow>(
		"SELECT group_id, name, owner, created_at FROM shared_groups WHERE group_id = $1",
	)
	.bind(group_id)
	.fetch_optional(executor)
	.await?;

	Ok(row.map(SharedGroup::from))
}

pub async fn add_group_document<'e, E>(
	executor: E,
	group_id: &str,
	doc_id: Uuid,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO shared_group_documents (group_id, doc_id, created_at)
VALUES ($1,$2,$3)
ON CONFLICT (group_id, doc_id) DO NOTHING",
	)
	.bind(group_id)
	.bind(doc_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn remove_group_document<'e, E>(executor: E, group_id: &str, doc_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("DELETE FROM shared_group_documents WHERE group_id = $1 AND doc_id = $2")
		.bind(group_id)
		.bind(doc_id)
		.execute(executor)
		.await?;

	Ok(())
}

pub async fn list_group_documents<'e, E>(executor: E, group_id: &str) -> Result<Vec<Uuid>>
where
	E: PgExecutor<'e>,
{
	let doc_ids: Vec<Uuid> = sqlx::query_scalar(
		"\
SELECT doc_id
FROM shared_group_documents
WHERE group_id = $1
ORDER BY created_at ASC, doc_id ASC",
	)
	.bind(group_id)
	.fetch_all(executor)
	.await?;

	Ok(doc_ids)
}

pub async fn delete_group<'e, E>(executor: E, group_id: &str) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM shared_groups WHERE group_id = $1")
		.bind(group_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() == 1)
}
