//! Storage seams of the pipeline and the ways to assemble them from configuration.

pub mod memory;
pub mod postgres;
pub mod qdrant;

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use confidant_config::{BACKEND_MEMORY, Config};
use confidant_domain::{
	credits::Plan,
	message::{Message, Role},
};
use confidant_storage::{db::Db, qdrant::QdrantStore};

use crate::{BoxFuture, Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct NewMessage<'a> {
	pub message_id: Uuid,
	pub user_id: &'a str,
	pub role: Role,
	pub content: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct NewEmbedding<'a> {
	pub message: &'a Message,
	pub embedding_version: &'a str,
	pub vector: &'a [f32],
}

#[derive(Debug, Clone)]
pub struct HistoryQuery {
	pub user_id: String,
	pub before: Option<OffsetDateTime>,
	pub before_seq: Option<i64>,
	pub limit: u32,
}

/// A vector with the payload the index filters and orders on.
#[derive(Debug, Clone)]
pub struct IndexEntry {
	pub message_id: Uuid,
	pub user_id: String,
	pub role: Role,
	pub seq: i64,
	pub created_at: OffsetDateTime,
	pub embedding_version: String,
	pub vector: Vec<f32>,
}
impl IndexEntry {
	pub fn new(message: &Message, embedding_version: &str, vector: Vec<f32>) -> Self {
		Self {
			message_id: message.message_id,
			user_id: message.user_id.clone(),
			role: message.role,
			seq: message.seq,
			created_at: message.created_at,
			embedding_version: embedding_version.to_string(),
			vector,
		}
	}
}

#[derive(Debug, Clone)]
pub struct VectorQuery {
	pub vector: Vec<f32>,
	pub user_id: String,
	pub role: Option<Role>,
	pub threshold: f32,
	pub limit: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
	pub message_id: Uuid,
	pub similarity: f32,
	pub seq: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditAccount {
	pub user_id: String,
	pub plan: Plan,
	pub balance: i64,
}

pub trait MessageRepository
where
	Self: Send + Sync,
{
	fn insert_message<'a>(&'a self, message: NewMessage<'a>) -> BoxFuture<'a, Result<Message>>;

	/// Returns `false` when the message already has an embedding for this version.
	fn insert_embedding<'a>(&'a self, embedding: NewEmbedding<'a>) -> BoxFuture<'a, Result<bool>>;

	/// Newest-first messages strictly older than the query cursor.
	fn fetch_page<'a>(&'a self, query: &'a HistoryQuery) -> BoxFuture<'a, Result<Vec<Message>>>;

	fn fetch_by_ids<'a>(&'a self, message_ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<Message>>>;

	/// Oldest-first messages with no embedding for `embedding_version`.
	fn list_unembedded<'a>(
		&'a self,
		embedding_version: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<Message>>>;

	/// Stored embeddings of `embedding_version` with `seq > after_seq`, in sequence order.
	fn list_embeddings<'a>(
		&'a self,
		embedding_version: &'a str,
		after_seq: i64,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<IndexEntry>>>;
}

pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn upsert<'a>(&'a self, entries: &'a [IndexEntry]) -> BoxFuture<'a, Result<()>>;

	fn search<'a>(&'a self, query: &'a VectorQuery) -> BoxFuture<'a, Result<Vec<VectorHit>>>;

	/// Drops every entry.
	fn reset(&self) -> BoxFuture<'_, Result<()>>;
}

pub trait CreditLedger
where
	Self: Send + Sync,
{
	/// Opens the account with `plan` when absent. An existing account is returned unchanged.
	fn open_account<'a>(
		&'a self,
		user_id: &'a str,
		plan: Plan,
		opening_balance: i64,
	) -> BoxFuture<'a, Result<CreditAccount>>;

	/// Debits atomically. `None` means the balance could not cover `amount`.
	fn debit<'a>(&'a self, user_id: &'a str, amount: i64) -> BoxFuture<'a, Result<Option<i64>>>;
}

#[derive(Clone)]
pub struct Backends {
	pub messages: Arc<dyn MessageRepository>,
	pub index: Arc<dyn VectorIndex>,
	pub credits: Arc<dyn CreditLedger>,
}
impl Backends {
	pub fn memory() -> Self {
		Self {
			messages: Arc::new(memory::MemoryMessageRepository::default()),
			index: Arc::new(memory::MemoryIndex::default()),
			credits: Arc::new(memory::MemoryCreditLedger::default()),
		}
	}

	/// Connects Postgres and Qdrant, bootstrapping the schema and the collection.
	pub async fn postgres(cfg: &Config) -> Result<Self> {
		let (Some(pg_cfg), Some(qdrant_cfg)) =
			(cfg.storage.postgres.as_ref(), cfg.storage.qdrant.as_ref())
		else {
			return Err(Error::invalid_request(
				"storage.postgres and storage.qdrant are required for the postgres backend.",
			));
		};
		let db = Db::connect(pg_cfg).await?;

		db.ensure_schema(qdrant_cfg.vector_dim).await?;

		let store = QdrantStore::new(qdrant_cfg)?;

		store.ensure_collection().await?;

		Ok(Self {
			messages: Arc::new(postgres::PgMessageRepository::new(db.clone())),
			index: Arc::new(qdrant::QdrantIndex::new(store)),
			credits: Arc::new(postgres::PgCreditLedger::new(db)),
		})
	}

	pub async fn from_config(cfg: &Config) -> Result<Self> {
		if cfg.storage.backend == BACKEND_MEMORY {
			tracing::warn!("Using the in-memory storage backend. Messages are not durable.");

			return Ok(Self::memory());
		}

		Self::postgres(cfg).await
	}
}
