use std::collections::HashMap;

use confidant_config::RetrievalScope;
use confidant_domain::{
	message::{RankedMessage, Role},
	similarity,
};

use crate::{ConfidantService, Error, Result, backends::VectorQuery};

#[derive(Debug, Clone, Copy)]
pub struct RetrievalQuery<'a> {
	pub text: &'a str,
	pub user_id: &'a str,
	pub role: Option<Role>,
	pub threshold: f32,
	pub limit: u32,
}
impl<'a> RetrievalQuery<'a> {
	pub fn scoped(text: &'a str, user_id: &'a str, role: Role, scope: RetrievalScope) -> Self {
		Self { text, user_id, role: Some(role), threshold: scope.threshold, limit: scope.limit }
	}
}

impl ConfidantService {
	/// Best-effort similarity search. Any embedding or search failure yields no results.
	pub async fn find_similar(&self, query: RetrievalQuery<'_>) -> Vec<RankedMessage> {
		match self.try_find_similar(query).await {
			Ok(hits) => hits,
			Err(err) => {
				tracing::warn!(
					error = %err,
					user_id = query.user_id,
					role = query.role.map(Role::as_str),
					"Similarity retrieval failed. Continuing without results."
				);

				Vec::new()
			},
		}
	}

	/// Similar past user messages for the first-pass prompt.
	pub async fn user_context(&self, text: &str, user_id: &str) -> Vec<RankedMessage> {
		self.find_similar(RetrievalQuery::scoped(
			text,
			user_id,
			Role::User,
			self.cfg.retrieval.user_context,
		))
		.await
	}

	/// Similar past assistant replies for the duplication check.
	pub async fn assistant_duplicates(&self, text: &str, user_id: &str) -> Vec<RankedMessage> {
		self.find_similar(RetrievalQuery::scoped(
			text,
			user_id,
			Role::Assistant,
			self.cfg.retrieval.assistant_duplicates,
		))
		.await
	}

	async fn try_find_similar(&self, query: RetrievalQuery<'_>) -> Result<Vec<RankedMessage>> {
		if query.text.trim().is_empty() || query.limit == 0 {
			return Ok(Vec::new());
		}

		let vector = self.embed_one(query.text).await?;
		let hits = self
			.backends
			.index
			.search(&VectorQuery {
				vector,
				user_id: query.user_id.to_string(),
				role: query.role,
				threshold: query.threshold,
				limit: query.limit,
			})
			.await
			.map_err(as_search_error)?;
		let scores = hits
			.into_iter()
			.filter(|hit| hit.similarity >= query.threshold)
			.map(|hit| (hit.message_id, hit.similarity))
			.collect::<HashMap<_, _>>();

		if scores.is_empty() {
			return Ok(Vec::new());
		}

		let ids = scores.keys().copied().collect::<Vec<_>>();
		let messages =
			self.backends.messages.fetch_by_ids(&ids).await.map_err(as_search_error)?;
		// The index is only trusted for candidates; ownership and role come from the store.
		let mut ranked = messages
			.into_iter()
			.filter(|message| message.user_id == query.user_id)
			.filter(|message| query.role.is_none_or(|role| message.role == role))
			.filter_map(|message| {
				let similarity = *scores.get(&message.message_id)?;

				Some(RankedMessage { message, similarity })
			})
			.collect::<Vec<_>>();

		ranked.sort_by(|a, b| {
			similarity::rank_order(a.similarity, a.message.seq, b.similarity, b.message.seq)
		});
		ranked.truncate(query.limit as usize);

		tracing::debug!(
			user_id = query.user_id,
			role = query.role.map(Role::as_str),
			hits = ranked.len(),
			"Similarity retrieval finished."
		);

		Ok(ranked)
	}
}

fn as_search_error(err: Error) -> Error {
	match err {
		Error::Search { .. } => err,
		other => Error::Search { message: other.to_string() },
	}
}
