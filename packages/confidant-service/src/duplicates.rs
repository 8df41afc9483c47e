use serde::Serialize;

use confidant_domain::prompt;

use crate::ConfidantService;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DuplicationCheck {
	pub needs_refinement: bool,
	/// Matched past replies joined by newlines, in rank order.
	pub similar_context: Option<String>,
}

impl ConfidantService {
	/// Compares the candidate against the user's past assistant replies.
	pub async fn check_duplicates(&self, candidate: &str, user_id: &str) -> DuplicationCheck {
		let hits = self.assistant_duplicates(candidate, user_id).await;
		let similar_context =
			prompt::join_context(hits.iter().map(|hit| hit.message.content.as_str()));

		tracing::debug!(user_id, hits = hits.len(), "Duplication check finished.");

		DuplicationCheck { needs_refinement: similar_context.is_some(), similar_context }
	}
}
