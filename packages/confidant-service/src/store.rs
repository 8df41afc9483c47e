//! Message persistence: save with best-effort embedding, paged history, orphan repair.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use confidant_domain::message::{Message, Role};

use crate::{
	ConfidantService, Error, Result,
	backends::{HistoryQuery, IndexEntry, NewEmbedding, NewMessage},
};

const REBUILD_PAGE_SIZE: u32 = 256;

#[derive(Debug, Clone, Deserialize)]
pub struct SaveMessageRequest {
	pub user_id: String,
	pub role: Role,
	pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveMessageResponse {
	pub message_id: Uuid,
	pub seq: i64,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	/// `false` when the message was stored but embedding or indexing failed.
	pub embedded: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchMessagesRequest {
	pub user_id: String,
	pub limit: Option<u32>,
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub before: Option<OffsetDateTime>,
	pub before_seq: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryCursor {
	#[serde(with = "time::serde::rfc3339")]
	pub before: OffsetDateTime,
	pub before_seq: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
	/// Oldest first.
	pub messages: Vec<Message>,
	pub has_more: bool,
	pub next_cursor: Option<HistoryCursor>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
	pub scanned: u64,
	pub embedded: u64,
	pub failed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
	pub indexed: u64,
	pub skipped: u64,
}

impl ConfidantService {
	pub async fn save_message(&self, req: SaveMessageRequest) -> Result<SaveMessageResponse> {
		if req.user_id.trim().is_empty() {
			return Err(Error::invalid_request("user_id must be non-empty."));
		}
		if req.content.trim().is_empty() {
			return Err(Error::invalid_request("content must be non-empty."));
		}

		let message = self
			.backends
			.messages
			.insert_message(NewMessage {
				message_id: Uuid::new_v4(),
				user_id: &req.user_id,
				role: req.role,
				content: &req.content,
			})
			.await?;
		let embedded = match self.index_message(&message).await {
			Ok(()) => true,
			Err(err) => {
				tracing::warn!(
					error = %err,
					message_id = %message.message_id,
					user_id = %message.user_id,
					"Message stored without embedding. Backfill will retry."
				);

				false
			},
		};

		Ok(SaveMessageResponse {
			message_id: message.message_id,
			seq: message.seq,
			created_at: message.created_at,
			embedded,
		})
	}

	pub async fn fetch_messages(&self, req: FetchMessagesRequest) -> Result<HistoryPage> {
		if req.user_id.trim().is_empty() {
			return Err(Error::invalid_request("user_id must be non-empty."));
		}
		if req.before_seq.is_some() && req.before.is_none() {
			return Err(Error::invalid_request("before_seq requires before."));
		}

		let history = &self.cfg.history;
		let limit = req.limit.unwrap_or(history.default_page_size).clamp(1, history.max_page_size);
		let query = HistoryQuery {
			user_id: req.user_id,
			before: req.before,
			before_seq: req.before_seq,
			limit: limit + 1,
		};
		let mut messages = self.backends.messages.fetch_page(&query).await?;
		let has_more = messages.len() > limit as usize;

		messages.truncate(limit as usize);
		messages.reverse();

		let next_cursor = if has_more {
			messages.first().map(|oldest| HistoryCursor {
				before: oldest.created_at,
				before_seq: oldest.seq,
			})
		} else {
			None
		};

		Ok(HistoryPage { messages, has_more, next_cursor })
	}

	/// Embeds and indexes up to `batch` messages lacking an embedding for the current version.
	pub async fn backfill_embeddings(&self, batch: u32) -> Result<BackfillReport> {
		let version = self.embedding_version();
		let orphans = self.backends.messages.list_unembedded(&version, batch).await?;
		let mut report = BackfillReport { scanned: orphans.len() as u64, ..Default::default() };

		if orphans.is_empty() {
			return Ok(report);
		}

		let texts = orphans.iter().map(|message| message.content.clone()).collect::<Vec<_>>();
		let vectors = self.embed_texts(&texts).await?;

		for (message, vector) in orphans.iter().zip(vectors) {
			match self.store_embedding(message, &version, vector).await {
				Ok(()) => report.embedded += 1,
				Err(err) => {
					report.failed += 1;

					tracing::warn!(
						error = %err,
						message_id = %message.message_id,
						"Backfill failed for message."
					);
				},
			}
		}

		tracing::info!(
			scanned = report.scanned,
			embedded = report.embedded,
			failed = report.failed,
			"Embedding backfill pass finished."
		);

		Ok(report)
	}

	/// Resets the vector index and reloads it from stored embeddings without re-embedding.
	pub async fn rebuild_index(&self) -> Result<RebuildReport> {
		let version = self.embedding_version();
		let expected_dim = self.cfg.providers.embedding.dimensions as usize;
		let mut report = RebuildReport::default();
		let mut after_seq = 0;

		self.backends.index.reset().await?;

		loop {
			let page =
				self.backends.messages.list_embeddings(&version, after_seq, REBUILD_PAGE_SIZE).await?;
			let Some(last) = page.last() else {
				break;
			};

			after_seq = last.seq;

			let (valid, invalid): (Vec<_>, Vec<_>) =
				page.into_iter().partition(|entry| entry.vector.len() == expected_dim);

			report.skipped += invalid.len() as u64;

			self.backends.index.upsert(&valid).await?;

			report.indexed += valid.len() as u64;
		}

		tracing::info!(
			indexed = report.indexed,
			skipped = report.skipped,
			"Vector index rebuilt."
		);

		Ok(report)
	}

	pub(crate) async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let cfg = &self.cfg.providers.embedding;
		let vectors = self.providers.embedding.embed(cfg, texts).await?;

		if vectors.len() != texts.len() {
			return Err(Error::Embedding {
				message: format!(
					"Embedding provider returned {} vectors for {} texts.",
					vectors.len(),
					texts.len()
				),
			});
		}
		if vectors.iter().any(|vector| vector.len() != cfg.dimensions as usize) {
			return Err(Error::Embedding {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok(vectors)
	}

	pub(crate) async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
		let mut vectors = self.embed_texts(&[text.to_string()]).await?;

		vectors.pop().ok_or_else(|| Error::Embedding {
			message: "Embedding provider returned no vector.".to_string(),
		})
	}

	async fn index_message(&self, message: &Message) -> Result<()> {
		let vector = self.embed_one(&message.content).await?;

		self.store_embedding(message, &self.embedding_version(), vector).await
	}

	/// Indexes the vector before recording the embedding row, so a stored row implies an indexed
	/// message and an index failure leaves the message visible to backfill. Both writes are
	/// idempotent per message.
	async fn store_embedding(&self, message: &Message, version: &str, vector: Vec<f32>) -> Result<()> {
		let entry = IndexEntry::new(message, version, vector);

		self.backends.index.upsert(std::slice::from_ref(&entry)).await?;
		self.backends
			.messages
			.insert_embedding(NewEmbedding {
				message,
				embedding_version: version,
				vector: &entry.vector,
			})
			.await?;

		Ok(())
	}
}
