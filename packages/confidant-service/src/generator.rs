use confidant_domain::{
	message::{ChatTurn, Reasoning},
	prompt,
};

use crate::{ConfidantService, Error, Result};

impl ConfidantService {
	/// First-pass reply. The optional context is injected into the system instruction.
	pub async fn generate(
		&self,
		conversation: &[ChatTurn],
		context: Option<&str>,
		reasoning: Option<Reasoning>,
	) -> Result<String> {
		let instruction = prompt::first_pass_instruction(
			self.persona(),
			context,
			prompt::current_user_message(conversation),
		);

		self.complete_with_instruction(instruction, conversation, reasoning).await
	}

	pub(crate) async fn complete_with_instruction(
		&self,
		instruction: String,
		conversation: &[ChatTurn],
		reasoning: Option<Reasoning>,
	) -> Result<String> {
		let turns = prompt::compose_turns(instruction, &self.cfg.pipeline.greeting, conversation);
		let reply = self
			.providers
			.chat
			.complete(&self.cfg.providers.chat, &turns, reasoning)
			.await
			.map_err(|err| match err {
				Error::Generation { .. } => err,
				other => Error::Generation { message: other.to_string() },
			})?;
		let reply = reply.trim();

		if reply.is_empty() {
			return Err(Error::Generation { message: "Model returned an empty reply.".to_string() });
		}

		Ok(reply.to_string())
	}
}
