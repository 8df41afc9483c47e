use uuid::Uuid;

use confidant_domain::{credits::Plan, message::Message};
use confidant_storage::{credits, db::Db, models::MessageRow, queries};

use crate::{
	BoxFuture, Error, Result,
	backends::{
		CreditAccount, CreditLedger, HistoryQuery, IndexEntry, MessageRepository, NewEmbedding,
		NewMessage,
	},
};

pub struct PgMessageRepository {
	db: Db,
}
impl PgMessageRepository {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}

impl MessageRepository for PgMessageRepository {
	fn insert_message<'a>(&'a self, message: NewMessage<'a>) -> BoxFuture<'a, Result<Message>> {
		Box::pin(async move {
			let row = queries::insert_message(
				&self.db,
				message.message_id,
				message.user_id,
				message.role,
				message.content,
			)
			.await?;

			Ok(row.into_message()?)
		})
	}

	fn insert_embedding<'a>(&'a self, embedding: NewEmbedding<'a>) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let inserted = queries::insert_message_embedding(
				&self.db,
				embedding.message.message_id,
				embedding.embedding_version,
				&embedding.message.user_id,
				embedding.message.role,
				embedding.vector,
			)
			.await?;

			Ok(inserted)
		})
	}

	fn fetch_page<'a>(&'a self, query: &'a HistoryQuery) -> BoxFuture<'a, Result<Vec<Message>>> {
		Box::pin(async move {
			let rows = queries::fetch_messages_page(
				&self.db,
				&query.user_id,
				query.before,
				query.before_seq,
				i64::from(query.limit),
			)
			.await?;

			into_messages(rows)
		})
	}

	fn fetch_by_ids<'a>(&'a self, message_ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<Message>>> {
		Box::pin(async move {
			let rows = queries::fetch_messages_by_ids(&self.db, message_ids).await?;

			into_messages(rows)
		})
	}

	fn list_unembedded<'a>(
		&'a self,
		embedding_version: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<Message>>> {
		Box::pin(async move {
			let rows =
				queries::list_unembedded_messages(&self.db, embedding_version, i64::from(limit))
					.await?;

			into_messages(rows)
		})
	}

	fn list_embeddings<'a>(
		&'a self,
		embedding_version: &'a str,
		after_seq: i64,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<IndexEntry>>> {
		Box::pin(async move {
			let rows = queries::list_message_embeddings(
				&self.db,
				embedding_version,
				after_seq,
				i64::from(limit),
			)
			.await?;
			let mut entries = Vec::with_capacity(rows.len());

			for row in rows {
				let vector = row.vector()?;
				let role = row.role.parse().map_err(|err| Error::Persistence {
					message: format!("Stored embedding role: {err}"),
				})?;

				entries.push(IndexEntry {
					message_id: row.message_id,
					user_id: row.user_id,
					role,
					seq: row.seq,
					created_at: row.created_at,
					embedding_version: embedding_version.to_string(),
					vector,
				});
			}

			Ok(entries)
		})
	}
}

pub struct PgCreditLedger {
	db: Db,
}
impl PgCreditLedger {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}

impl CreditLedger for PgCreditLedger {
	fn open_account<'a>(
		&'a self,
		user_id: &'a str,
		plan: Plan,
		opening_balance: i64,
	) -> BoxFuture<'a, Result<CreditAccount>> {
		Box::pin(async move {
			let row = credits::ensure_account(&self.db, user_id, plan, opening_balance).await?;
			let plan = row.plan()?;

			Ok(CreditAccount { user_id: row.user_id, plan, balance: row.balance })
		})
	}

	fn debit<'a>(&'a self, user_id: &'a str, amount: i64) -> BoxFuture<'a, Result<Option<i64>>> {
		Box::pin(async move { Ok(credits::debit(&self.db, user_id, amount).await?) })
	}
}

fn into_messages(rows: Vec<MessageRow>) -> Result<Vec<Message>> {
	rows.into_iter().map(|row| row.into_message().map_err(Error::from)).collect()
}
