use time::OffsetDateTime;
use uuid::Uuid;

use confidant_domain::message::Role;

use crate::{
	Error, Result,
	db::Db,
	models::{MessageEmbeddingRow, MessageRow},
};

pub async fn insert_message(
	db: &Db,
	message_id: Uuid,
	user_id: &str,
	role: Role,
	content: &str,
) -> Result<MessageRow> {
	let row = sqlx::query_as::<_, MessageRow>(
		"\
INSERT INTO messages (message_id, user_id, role, content)
VALUES ($1, $2, $3, $4)
RETURNING message_id, seq, user_id, role, content, created_at",
	)
	.bind(message_id)
	.bind(user_id)
	.bind(role.as_str())
	.bind(content)
	.fetch_one(&db.pool)
	.await?;

	Ok(row)
}

/// Returns `false` when an embedding for this message and version already exists.
pub async fn insert_message_embedding(
	db: &Db,
	message_id: Uuid,
	embedding_version: &str,
	user_id: &str,
	role: Role,
	vec: &[f32],
) -> Result<bool> {
	let embedding_dim = i32::try_from(vec.len())
		.map_err(|_| Error::InvalidArgument("Embedding dimension is out of range.".to_string()))?;
	let result = sqlx::query(
		"\
INSERT INTO message_embeddings (message_id, embedding_version, embedding_dim, user_id, role, vec)
VALUES ($1, $2, $3, $4, $5, $6::text::vector)
ON CONFLICT (message_id, embedding_version) DO NOTHING",
	)
	.bind(message_id)
	.bind(embedding_version)
	.bind(embedding_dim)
	.bind(user_id)
	.bind(role.as_str())
	.bind(vector_to_pg(vec))
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Newest-first page of a user's messages strictly older than the cursor.
///
/// With only `before`, the boundary is the timestamp. With `before_seq` as well, the boundary is
/// the exact `(created_at, seq)` key.
pub async fn fetch_messages_page(
	db: &Db,
	user_id: &str,
	before: Option<OffsetDateTime>,
	before_seq: Option<i64>,
	limit: i64,
) -> Result<Vec<MessageRow>> {
	let rows = sqlx::query_as::<_, MessageRow>(
		"\
SELECT message_id, seq, user_id, role, content, created_at
FROM messages
WHERE user_id = $1
	AND (
		$2::timestamptz IS NULL
		OR created_at < $2
		OR ($3::bigint IS NOT NULL AND created_at = $2 AND seq < $3)
	)
ORDER BY created_at DESC, seq DESC
LIMIT $4",
	)
	.bind(user_id)
	.bind(before)
	.bind(before_seq)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn fetch_messages_by_ids(db: &Db, message_ids: &[Uuid]) -> Result<Vec<MessageRow>> {
	if message_ids.is_empty() {
		return Ok(Vec::new());
	}

	let rows = sqlx::query_as::<_, MessageRow>(
		"\
SELECT message_id, seq, user_id, role, content, created_at
FROM messages
WHERE message_id = ANY($1)",
	)
	.bind(message_ids)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Oldest messages without an embedding for `embedding_version`.
pub async fn list_unembedded_messages(
	db: &Db,
	embedding_version: &str,
	limit: i64,
) -> Result<Vec<MessageRow>> {
	let rows = sqlx::query_as::<_, MessageRow>(
		"\
SELECT m.message_id, m.seq, m.user_id, m.role, m.content, m.created_at
FROM messages m
LEFT JOIN message_embeddings e
	ON e.message_id = m.message_id AND e.embedding_version = $1
WHERE e.message_id IS NULL
ORDER BY m.seq ASC
LIMIT $2",
	)
	.bind(embedding_version)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Keyset scan over stored embeddings in message order.
pub async fn list_message_embeddings(
	db: &Db,
	embedding_version: &str,
	after_seq: i64,
	limit: i64,
) -> Result<Vec<MessageEmbeddingRow>> {
	let rows = sqlx::query_as::<_, MessageEmbeddingRow>(
		"\
SELECT e.message_id, e.user_id, e.role, m.seq, m.created_at, e.vec::text AS vec_text
FROM message_embeddings e
JOIN messages m ON m.message_id = e.message_id
WHERE e.embedding_version = $1 AND m.seq > $2
ORDER BY m.seq ASC
LIMIT $3",
	)
	.bind(embedding_version)
	.bind(after_seq)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub fn vector_to_pg(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);

	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

pub fn parse_pg_vector(text: &str) -> Result<Vec<f32>> {
	let trimmed = text.trim();
	let without_brackets = trimmed
		.strip_prefix('[')
		.and_then(|s| s.strip_suffix(']'))
		.ok_or_else(|| Error::InvalidArgument("Vector text is not bracketed.".to_string()))?;

	if without_brackets.trim().is_empty() {
		return Ok(Vec::new());
	}

	let mut vec = Vec::new();

	for part in without_brackets.split(',') {
		let value: f32 = part.trim().parse().map_err(|_| {
			Error::InvalidArgument("Vector text contains a non-numeric value.".to_string())
		})?;

		vec.push(value);
	}

	Ok(vec)
}
