use confidant_storage::qdrant::{IndexPoint, QdrantStore};

use crate::{
	BoxFuture, Error, Result,
	backends::{IndexEntry, VectorHit, VectorIndex, VectorQuery},
};

pub struct QdrantIndex {
	store: QdrantStore,
}
impl QdrantIndex {
	pub fn new(store: QdrantStore) -> Self {
		Self { store }
	}
}

impl VectorIndex for QdrantIndex {
	fn upsert<'a>(&'a self, entries: &'a [IndexEntry]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let points = entries
				.iter()
				.map(|entry| IndexPoint {
					message_id: entry.message_id,
					user_id: entry.user_id.clone(),
					role: entry.role.as_str().to_string(),
					seq: entry.seq,
					created_at: entry.created_at,
					embedding_version: entry.embedding_version.clone(),
					vector: entry.vector.clone(),
				})
				.collect::<Vec<_>>();

			Ok(self.store.upsert(&points).await?)
		})
	}

	fn search<'a>(&'a self, query: &'a VectorQuery) -> BoxFuture<'a, Result<Vec<VectorHit>>> {
		Box::pin(async move {
			let hits = self
				.store
				.search(
					query.vector.clone(),
					&query.user_id,
					query.role.map(|role| role.as_str()),
					query.threshold,
					query.limit,
				)
				.await
				.map_err(|err| Error::Search { message: err.to_string() })?;

			Ok(hits
				.into_iter()
				.map(|hit| VectorHit {
					message_id: hit.message_id,
					similarity: hit.score,
					seq: hit.seq,
				})
				.collect())
		})
	}

	fn reset(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move { Ok(self.store.reset().await?) })
	}
}
