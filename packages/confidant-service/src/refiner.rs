use serde::Serialize;

use confidant_domain::{
	message::{ChatTurn, Reasoning},
	prompt,
};

use crate::{ConfidantService, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Refinement {
	pub text: String,
	/// The refinement call failed and `text` is the original candidate.
	pub fell_back: bool,
}

impl ConfidantService {
	/// Rewrites the candidate away from the similar past replies. Never fails.
	pub async fn refine(
		&self,
		candidate: &str,
		similar_context: &str,
		conversation: &[ChatTurn],
		reasoning: Option<Reasoning>,
	) -> Refinement {
		match self.try_refine(candidate, similar_context, conversation, reasoning).await {
			Ok(text) => Refinement { text, fell_back: false },
			Err(err) => {
				tracing::warn!(error = %err, "Refinement failed. Keeping the first-pass reply.");

				Refinement { text: candidate.to_string(), fell_back: true }
			},
		}
	}

	async fn try_refine(
		&self,
		candidate: &str,
		similar_context: &str,
		conversation: &[ChatTurn],
		reasoning: Option<Reasoning>,
	) -> Result<String> {
		let instruction = prompt::refinement_instruction(self.persona(), similar_context, candidate);

		self.complete_with_instruction(instruction, conversation, reasoning)
			.await
			.map_err(|err| Error::Refinement { message: err.to_string() })
	}
}
