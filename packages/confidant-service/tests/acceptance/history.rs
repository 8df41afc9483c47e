use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};

use confidant_domain::message::Role;
use confidant_service::{
	Backends, BoxFuture, Error, FetchMessagesRequest, Result, RetrievalQuery, SaveMessageRequest,
	backends::{
		IndexEntry, VectorHit, VectorIndex, VectorQuery,
		memory::{MemoryCreditLedger, MemoryIndex, MemoryMessageRepository},
	},
};

use super::{Harness, ScriptedChat, test_config};

/// Rejects the first `failures` upserts, then behaves like the in-memory index.
struct FlakyIndex {
	inner: MemoryIndex,
	failures: AtomicUsize,
}
impl FlakyIndex {
	fn failing(failures: usize) -> Self {
		Self { inner: MemoryIndex::default(), failures: AtomicUsize::new(failures) }
	}
}
impl VectorIndex for FlakyIndex {
	fn upsert<'a>(&'a self, entries: &'a [IndexEntry]) -> BoxFuture<'a, Result<()>> {
		let fail = self
			.failures
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
			.is_ok();

		if fail {
			return Box::pin(async {
				Err(Error::Search { message: "Vector index unavailable.".to_string() })
			});
		}

		self.inner.upsert(entries)
	}

	fn search<'a>(&'a self, query: &'a VectorQuery) -> BoxFuture<'a, Result<Vec<VectorHit>>> {
		self.inner.search(query)
	}

	fn reset(&self) -> BoxFuture<'_, Result<()>> {
		self.inner.reset()
	}
}

fn page_request(user_id: &str, limit: u32) -> FetchMessagesRequest {
	FetchMessagesRequest { user_id: user_id.to_string(), limit: Some(limit), ..Default::default() }
}

#[tokio::test]
async fn history_pages_newest_window_oldest_first() {
	let harness = Harness::new(ScriptedChat::default());

	for i in 0..45 {
		let role = if i % 2 == 0 { Role::User } else { Role::Assistant };

		harness.save("u1", role, &format!("message number {i}")).await;
	}

	let first = harness.service.fetch_messages(page_request("u1", 20)).await.expect("Fetch failed.");
	let contents = first.messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>();

	assert_eq!(contents.len(), 20);
	assert_eq!(contents.first(), Some(&"message number 25"));
	assert_eq!(contents.last(), Some(&"message number 44"));
	assert!(first.has_more);
	assert!(first.messages.windows(2).all(|pair| pair[0].seq < pair[1].seq));

	let mut seen = first.messages.len();
	let mut cursor = first.next_cursor;
	let mut oldest_seq = first.messages[0].seq;

	while let Some(next) = cursor {
		let page = harness
			.service
			.fetch_messages(FetchMessagesRequest {
				before: Some(next.before),
				before_seq: Some(next.before_seq),
				..page_request("u1", 20)
			})
			.await
			.expect("Fetch failed.");

		assert!(page.messages.iter().all(|m| m.seq < oldest_seq));

		oldest_seq = page.messages[0].seq;
		seen += page.messages.len();
		cursor = page.next_cursor;

		assert_eq!(page.has_more, cursor.is_some());
	}

	assert_eq!(seen, 45);
}

#[tokio::test]
async fn history_is_scoped_per_user() {
	let harness = Harness::new(ScriptedChat::default());

	harness.save("u1", Role::User, "mine").await;
	harness.save("u2", Role::User, "theirs").await;

	let page = harness.service.fetch_messages(page_request("u1", 20)).await.expect("Fetch failed.");

	assert_eq!(page.messages.len(), 1);
	assert_eq!(page.messages[0].content, "mine");
	assert!(!page.has_more);
	assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn page_size_is_clamped() {
	let harness = Harness::new(ScriptedChat::default());

	for i in 0..3 {
		harness.save("u1", Role::User, &format!("entry {i}")).await;
	}

	let zero = harness.service.fetch_messages(page_request("u1", 0)).await.expect("Fetch failed.");
	let defaulted = harness
		.service
		.fetch_messages(FetchMessagesRequest { user_id: "u1".to_string(), ..Default::default() })
		.await
		.expect("Fetch failed.");

	assert_eq!(zero.messages.len(), 1);
	assert!(zero.has_more);
	assert_eq!(defaulted.messages.len(), 3);
}

#[tokio::test]
async fn cursor_requires_timestamp() {
	let harness = Harness::new(ScriptedChat::default());
	let err = harness
		.service
		.fetch_messages(FetchMessagesRequest { before_seq: Some(3), ..page_request("u1", 5) })
		.await
		.expect_err("Expected invalid request.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
}

#[tokio::test]
async fn blank_messages_are_rejected() {
	let harness = Harness::new(ScriptedChat::default());

	for (user_id, content) in [("u1", "   "), (" ", "hello")] {
		let err = harness
			.service
			.save_message(SaveMessageRequest {
				user_id: user_id.to_string(),
				role: Role::User,
				content: content.to_string(),
			})
			.await
			.expect_err("Expected invalid request.");

		assert!(matches!(err, Error::InvalidRequest { .. }));
	}

	assert_eq!(harness.embedding.count(), 0);
}

#[tokio::test]
async fn embedding_failure_keeps_the_message_and_backfill_repairs_it() {
	let harness = Harness::new(ScriptedChat::default());

	harness.embedding.set_failing(true);

	let saved = harness
		.service
		.save_message(SaveMessageRequest {
			user_id: "u1".to_string(),
			role: Role::User,
			content: "remember the lighthouse".to_string(),
		})
		.await
		.expect("Save must succeed without embeddings.");

	assert!(!saved.embedded);

	let page = harness.service.fetch_messages(page_request("u1", 20)).await.expect("Fetch failed.");

	assert_eq!(page.messages.len(), 1);

	let failed = harness.service.backfill_embeddings(10).await;

	assert!(matches!(failed, Err(Error::Embedding { .. })));

	harness.embedding.set_failing(false);

	let report = harness.service.backfill_embeddings(10).await.expect("Backfill failed.");

	assert_eq!((report.scanned, report.embedded, report.failed), (1, 1, 0));

	let again = harness.service.backfill_embeddings(10).await.expect("Backfill failed.");

	assert_eq!(again.scanned, 0);

	let hits = harness
		.service
		.find_similar(RetrievalQuery {
			text: "remember the lighthouse",
			user_id: "u1",
			role: Some(Role::User),
			threshold: 0.9,
			limit: 5,
		})
		.await;

	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].message.message_id, saved.message_id);
}

#[tokio::test]
async fn rebuild_restores_search_without_reembedding() {
	let harness = Harness::new(ScriptedChat::default());

	harness.save("u1", Role::Assistant, "see you at sunrise").await;
	harness.save("u1", Role::Assistant, "coffee first, always").await;

	let calls_before = harness.embedding.count();
	let report = harness.service.rebuild_index().await.expect("Rebuild failed.");

	assert_eq!((report.indexed, report.skipped), (2, 0));
	assert_eq!(harness.embedding.count(), calls_before);

	let hits = harness
		.service
		.find_similar(RetrievalQuery {
			text: "see you at sunrise",
			user_id: "u1",
			role: Some(Role::Assistant),
			threshold: 0.9,
			limit: 5,
		})
		.await;

	assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn index_failure_leaves_the_message_for_backfill() {
	let backends = Backends {
		messages: Arc::new(MemoryMessageRepository::default()),
		index: Arc::new(FlakyIndex::failing(1)),
		credits: Arc::new(MemoryCreditLedger::default()),
	};
	let harness = Harness::with_backends(test_config(), backends, ScriptedChat::default());
	let saved = harness
		.service
		.save_message(SaveMessageRequest {
			user_id: "u1".to_string(),
			role: Role::User,
			content: "remember the lighthouse".to_string(),
		})
		.await
		.expect("Save must succeed when indexing fails.");

	assert!(!saved.embedded);

	let report = harness.service.backfill_embeddings(10).await.expect("Backfill failed.");

	assert_eq!((report.scanned, report.embedded, report.failed), (1, 1, 0));

	let hits = harness
		.service
		.find_similar(RetrievalQuery {
			text: "remember the lighthouse",
			user_id: "u1",
			role: Some(Role::User),
			threshold: 0.9,
			limit: 5,
		})
		.await;

	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].message.message_id, saved.message_id);
}
