use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use perimeter_domain::{Document, DocumentStatus, NewDocument, Perimeter, perimeter::delimit};

use crate::{Result, models::DocumentRow};

pub async fn insert_document<'e, E>(
	executor: E,
	doc: &NewDocument,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO documents (
\tdoc_id,
\towner,
\tname,
\tcontent_type,
\tperimeter,
\tstatus,
\tcontent,
\tcreated_at,
\tupdated_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$8)",
	)
	.bind(doc.doc_id)
	.bind(doc.owner.as_str())
	.bind(doc.name.as_str())
	.bind(doc.content_type.as_str())
	.bind(doc.perimeter.to_string())
	.bind(DocumentStatus::Requested.as_str())
	.bind(doc.content.as_str())
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn fetch_document<'e, E>(executor: E, doc_id: Uuid) -> Result<Option<Document>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, DocumentRow>(
		"\
SELECT
\tdoc_id,
\towner,
\tname,
\tcontent_type,
\tperimeter,
\tstatus,
\tcreated_at,
\tupdated_at
FROM documents
WHERE doc_id = $1",
	)
	.bind(doc_id)
	.fetch_optional(executor)
	.await?;

	row.map(Document::try_from).transpose()
}

pub async fn fetch_content<'e, E>(executor: E, doc_id: Uuid) -> Result<Option<String>>
where
	E: PgExecutor<'e>,
{
	let content: Option<String> =
		sqlx::query_scalar("SELECT content FROM documents WHERE doc_id = $1")
			.bind(doc_id)
			.fetch_optional(executor)
			.await?;

	Ok(content)
}

pub async fn fetch_perimeter<'e, E>(executor: E, doc_id: Uuid) -> Result<Option<Perimeter>>
where
	E: PgExecutor<'e>,
{
	let raw: Option<String> =
		sqlx::query_scalar("SELECT perimeter FROM documents WHERE doc_id = $1")
			.bind(doc_id)
			.fetch_optional(executor)
			.await?;

	Ok(raw.map(|raw| Perimeter::parse(&raw)))
}

/// Documents whose perimeter carries `token`, excluding the ones `token` owns.
pub async fn list_documents_with_token<'e, E>(executor: E, token: &str) -> Result<Vec<Uuid>>
where
	E: PgExecutor<'e>,
{
	let doc_ids: Vec<Uuid> = sqlx::query_scalar(
		"\
SELECT doc_id
FROM documents
WHERE strpos(perimeter, $1) > 0 AND owner <> $2
ORDER BY created_at ASC, doc_id ASC",
	)
	.bind(delimit(token))
	.bind(token)
	.fetch_all(executor)
	.await?;

	Ok(doc_ids)
}

pub async fn update_perimeter<'e, E>(
	executor: E,
	doc_id: Uuid,
	perimeter: &Perimeter,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result =
		sqlx::query("UPDATE documents SET perimeter = $1, updated_at = $2 WHERE doc_id = $3")
			.bind(perimeter.to_string())
			.bind(now)
			.bind(doc_id)
			.execute(executor)
			.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn update_status<'e, E>(
	executor: E,
	doc_id: Uuid,
	status: DocumentStatus,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("UPDATE documents SET status = $1, updated_at = $2 WHERE doc_id = $3")
		.bind(status.as_str())
		.bind(now)
		.bind(doc_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn delete_document<'e, E>(executor: E, doc_id: Uuid) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM documents WHERE doc_id = $1")
		.bind(doc_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() == 1)
}
