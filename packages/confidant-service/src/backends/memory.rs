use std::{
	collections::HashMap,
	sync::{Mutex, MutexGuard},
};

use time::OffsetDateTime;
use uuid::Uuid;

use confidant_domain::{credits::Plan, message::Message, similarity};

use crate::{
	BoxFuture, Result,
	backends::{
		CreditAccount, CreditLedger, HistoryQuery, IndexEntry, MessageRepository, NewEmbedding,
		NewMessage, VectorHit, VectorIndex, VectorQuery,
	},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}

#[derive(Default)]
pub struct MemoryMessageRepository {
	inner: Mutex<MessageTables>,
}

#[derive(Default)]
struct MessageTables {
	messages: Vec<Message>,
	embeddings: HashMap<(Uuid, String), Vec<f32>>,
	last_seq: i64,
}

impl MessageRepository for MemoryMessageRepository {
	fn insert_message<'a>(&'a self, message: NewMessage<'a>) -> BoxFuture<'a, Result<Message>> {
		Box::pin(async move {
			let mut tables = lock(&self.inner);

			tables.last_seq += 1;

			let stored = Message {
				message_id: message.message_id,
				seq: tables.last_seq,
				user_id: message.user_id.to_string(),
				role: message.role,
				content: message.content.to_string(),
				created_at: OffsetDateTime::now_utc(),
			};

			tables.messages.push(stored.clone());

			Ok(stored)
		})
	}

	fn insert_embedding<'a>(&'a self, embedding: NewEmbedding<'a>) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut tables = lock(&self.inner);
			let key = (embedding.message.message_id, embedding.embedding_version.to_string());

			if tables.embeddings.contains_key(&key) {
				return Ok(false);
			}

			tables.embeddings.insert(key, embedding.vector.to_vec());

			Ok(true)
		})
	}

	fn fetch_page<'a>(&'a self, query: &'a HistoryQuery) -> BoxFuture<'a, Result<Vec<Message>>> {
		Box::pin(async move {
			let tables = lock(&self.inner);
			let mut page = tables
				.messages
				.iter()
				.filter(|message| message.user_id == query.user_id)
				.filter(|message| match (query.before, query.before_seq) {
					(None, _) => true,
					(Some(before), None) => message.created_at < before,
					(Some(before), Some(before_seq)) =>
						(message.created_at, message.seq) < (before, before_seq),
				})
				.cloned()
				.collect::<Vec<_>>();

			page.sort_by(|a, b| (b.created_at, b.seq).cmp(&(a.created_at, a.seq)));
			page.truncate(query.limit as usize);

			Ok(page)
		})
	}

	fn fetch_by_ids<'a>(&'a self, message_ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<Message>>> {
		Box::pin(async move {
			let tables = lock(&self.inner);

			Ok(tables
				.messages
				.iter()
				.filter(|message| message_ids.contains(&message.message_id))
				.cloned()
				.collect())
		})
	}

	fn list_unembedded<'a>(
		&'a self,
		embedding_version: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<Message>>> {
		Box::pin(async move {
			let tables = lock(&self.inner);

			Ok(tables
				.messages
				.iter()
				.filter(|message| {
					!tables
						.embeddings
						.contains_key(&(message.message_id, embedding_version.to_string()))
				})
				.take(limit as usize)
				.cloned()
				.collect())
		})
	}

	fn list_embeddings<'a>(
		&'a self,
		embedding_version: &'a str,
		after_seq: i64,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<IndexEntry>>> {
		Box::pin(async move {
			let tables = lock(&self.inner);
			let mut entries = Vec::new();

			for message in tables.messages.iter().filter(|message| message.seq > after_seq) {
				if entries.len() >= limit as usize {
					break;
				}

				let key = (message.message_id, embedding_version.to_string());

				if let Some(vector) = tables.embeddings.get(&key) {
					entries.push(IndexEntry::new(message, embedding_version, vector.clone()));
				}
			}

			Ok(entries)
		})
	}
}

/// Brute-force cosine index.
#[derive(Default)]
pub struct MemoryIndex {
	entries: Mutex<HashMap<Uuid, IndexEntry>>,
}

impl VectorIndex for MemoryIndex {
	fn upsert<'a>(&'a self, entries: &'a [IndexEntry]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut stored = lock(&self.entries);

			for entry in entries {
				stored.insert(entry.message_id, entry.clone());
			}

			Ok(())
		})
	}

	fn search<'a>(&'a self, query: &'a VectorQuery) -> BoxFuture<'a, Result<Vec<VectorHit>>> {
		Box::pin(async move {
			let stored = lock(&self.entries);
			let mut hits = stored
				.values()
				.filter(|entry| entry.user_id == query.user_id)
				.filter(|entry| query.role.is_none_or(|role| entry.role == role))
				.map(|entry| VectorHit {
					message_id: entry.message_id,
					similarity: similarity::cosine(&query.vector, &entry.vector),
					seq: entry.seq,
				})
				.filter(|hit| hit.similarity >= query.threshold)
				.collect::<Vec<_>>();

			hits.sort_by(|a, b| similarity::rank_order(a.similarity, a.seq, b.similarity, b.seq));
			hits.truncate(query.limit as usize);

			Ok(hits)
		})
	}

	fn reset(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			lock(&self.entries).clear();

			Ok(())
		})
	}
}

#[derive(Default)]
pub struct MemoryCreditLedger {
	accounts: Mutex<HashMap<String, CreditAccount>>,
}

impl CreditLedger for MemoryCreditLedger {
	fn open_account<'a>(
		&'a self,
		user_id: &'a str,
		plan: Plan,
		opening_balance: i64,
	) -> BoxFuture<'a, Result<CreditAccount>> {
		Box::pin(async move {
			let mut accounts = lock(&self.accounts);
			let account = accounts.entry(user_id.to_string()).or_insert_with(|| CreditAccount {
				user_id: user_id.to_string(),
				plan,
				balance: opening_balance,
			});

			Ok(account.clone())
		})
	}

	fn debit<'a>(&'a self, user_id: &'a str, amount: i64) -> BoxFuture<'a, Result<Option<i64>>> {
		Box::pin(async move {
			let mut accounts = lock(&self.accounts);
			let Some(account) = accounts.get_mut(user_id) else {
				return Ok(None);
			};

			if account.balance < amount {
				return Ok(None);
			}

			account.balance -= amount;

			Ok(Some(account.balance))
		})
	}
}
