//! One user turn: retrieve context, generate, check for self-duplication, refine when needed.

use std::{
	collections::HashMap,
	fmt,
	sync::{Arc, Mutex},
	time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{
	sync::{Mutex as AsyncMutex, OwnedMutexGuard},
	time::{self, Instant},
};

use confidant_domain::{
	message::{ChatRole, ChatTurn, Reasoning},
	prompt,
};

use crate::{ConfidantService, DuplicationCheck, Error, Refinement, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
	Idle,
	RetrievingUserContext,
	GeneratingFirst,
	CheckingDuplicates,
	RefiningResponse,
	Done,
}
impl TurnStage {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Idle => "idle",
			Self::RetrievingUserContext => "retrieving_user_context",
			Self::GeneratingFirst => "generating_first",
			Self::CheckingDuplicates => "checking_duplicates",
			Self::RefiningResponse => "refining_response",
			Self::Done => "done",
		}
	}

	pub fn can_transition_to(self, next: Self) -> bool {
		matches!(
			(self, next),
			(Self::Idle, Self::RetrievingUserContext)
				| (Self::RetrievingUserContext, Self::GeneratingFirst)
				| (Self::GeneratingFirst, Self::CheckingDuplicates)
				| (Self::GeneratingFirst, Self::Done)
				| (Self::CheckingDuplicates, Self::Done)
				| (Self::CheckingDuplicates, Self::RefiningResponse)
				| (Self::RefiningResponse, Self::Done)
		)
	}
}
impl fmt::Display for TurnStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
	/// The first-pass reply had no similar past replies.
	FirstPass,
	Refined,
	/// Refinement was needed but failed, so the first-pass reply was kept.
	RefinementFallback,
	/// Generation failed and the configured fallback reply was returned.
	Fallback,
}
impl TurnOutcome {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::FirstPass => "first_pass",
			Self::Refined => "refined",
			Self::RefinementFallback => "refinement_fallback",
			Self::Fallback => "fallback",
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
	pub user_id: String,
	/// Visible conversation including the new user message, oldest first.
	pub messages: Vec<ChatTurn>,
	#[serde(default)]
	pub reasoning: Option<Reasoning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
	pub reply: String,
	pub outcome: TurnOutcome,
	pub stages: Vec<TurnStage>,
}

/// Per-turn state. Each field is written by exactly one stage.
#[derive(Debug, Clone)]
pub struct PipelineState {
	conversation: Vec<ChatTurn>,
	reasoning: Option<Reasoning>,
	user_context: Option<String>,
	candidate: Option<String>,
	similar_context: Option<String>,
	final_reply: Option<String>,
	stage: TurnStage,
	visited: Vec<TurnStage>,
}
impl PipelineState {
	pub fn new(conversation: Vec<ChatTurn>, reasoning: Option<Reasoning>) -> Self {
		Self {
			conversation,
			reasoning,
			user_context: None,
			candidate: None,
			similar_context: None,
			final_reply: None,
			stage: TurnStage::Idle,
			visited: vec![TurnStage::Idle],
		}
	}

	pub fn stage(&self) -> TurnStage {
		self.stage
	}

	pub fn visited(&self) -> &[TurnStage] {
		&self.visited
	}

	pub fn conversation(&self) -> &[ChatTurn] {
		&self.conversation
	}

	pub fn user_context(&self) -> Option<&str> {
		self.user_context.as_deref()
	}

	pub fn candidate(&self) -> Option<&str> {
		self.candidate.as_deref()
	}

	pub fn similar_context(&self) -> Option<&str> {
		self.similar_context.as_deref()
	}

	pub fn final_reply(&self) -> Option<&str> {
		self.final_reply.as_deref()
	}

	pub fn advance(&mut self, next: TurnStage) -> Result<()> {
		if !self.stage.can_transition_to(next) {
			return Err(Error::InvalidTransition { from: self.stage, to: next });
		}

		self.stage = next;
		self.visited.push(next);

		Ok(())
	}

	fn into_response(self, outcome: TurnOutcome) -> TurnResponse {
		TurnResponse { reply: self.final_reply.unwrap_or_default(), outcome, stages: self.visited }
	}
}

impl ConfidantService {
	/// Runs one turn under `pipeline.turn_budget_ms`. Provider failures degrade, never abort.
	pub async fn run_turn(&self, req: TurnRequest) -> Result<TurnResponse> {
		if req.user_id.trim().is_empty() {
			return Err(Error::invalid_request("user_id must be non-empty."));
		}
		if req.messages.iter().any(|turn| turn.role == ChatRole::System) {
			return Err(Error::invalid_request("messages must be user or assistant turns."));
		}

		let deadline = Instant::now() + Duration::from_millis(self.cfg.pipeline.turn_budget_ms);
		let user_id = req.user_id.as_str();
		let mut state = PipelineState::new(req.messages, req.reasoning);

		state.advance(TurnStage::RetrievingUserContext)?;

		state.user_context = match prompt::current_user_message(&state.conversation) {
			Some(current) => match time::timeout_at(deadline, self.user_context(current, user_id))
				.await
			{
				Ok(hits) => prompt::join_context(hits.iter().map(|hit| hit.message.content.as_str())),
				Err(_) => {
					tracing::warn!(user_id, "Turn budget exhausted while retrieving user context.");

					None
				},
			},
			None => None,
		};

		state.advance(TurnStage::GeneratingFirst)?;

		let generated = time::timeout_at(
			deadline,
			self.generate(&state.conversation, state.user_context.as_deref(), state.reasoning),
		)
		.await
		.unwrap_or_else(|_| {
			Err(Error::Generation { message: "Turn budget exhausted.".to_string() })
		});
		let candidate = match generated {
			Ok(candidate) => candidate,
			Err(err) => {
				tracing::warn!(user_id, error = %err, "Generation failed. Returning fallback reply.");

				state.final_reply = Some(self.cfg.pipeline.fallback_reply.clone());

				state.advance(TurnStage::Done)?;

				return Ok(state.into_response(TurnOutcome::Fallback));
			},
		};

		state.candidate = Some(candidate.clone());

		state.advance(TurnStage::CheckingDuplicates)?;

		let check = time::timeout_at(deadline, self.check_duplicates(&candidate, user_id))
			.await
			.unwrap_or_else(|_| {
				tracing::warn!(user_id, "Turn budget exhausted during duplication check.");

				DuplicationCheck::default()
			});
		let Some(similar_context) = check.similar_context.filter(|_| check.needs_refinement) else {
			state.final_reply = Some(candidate);

			state.advance(TurnStage::Done)?;

			return Ok(state.into_response(TurnOutcome::FirstPass));
		};

		state.similar_context = Some(similar_context.clone());

		state.advance(TurnStage::RefiningResponse)?;

		let refinement = time::timeout_at(
			deadline,
			self.refine(&candidate, &similar_context, &state.conversation, state.reasoning),
		)
		.await
		.unwrap_or_else(|_| {
			tracing::warn!(user_id, "Turn budget exhausted during refinement.");

			Refinement { text: candidate.clone(), fell_back: true }
		});
		let outcome =
			if refinement.fell_back { TurnOutcome::RefinementFallback } else { TurnOutcome::Refined };

		state.final_reply = Some(refinement.text);

		state.advance(TurnStage::Done)?;

		tracing::info!(user_id, outcome = outcome.as_str(), "Turn finished.");

		Ok(state.into_response(outcome))
	}
}

/// Serializes turns per user. A guard outlives the request while its messages are persisted.
#[derive(Default)]
pub struct TurnLocks {
	locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}
impl TurnLocks {
	pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
		let lock = {
			let mut locks = self.locks.lock().unwrap_or_else(|err| err.into_inner());

			// Only the map holds idle entries.
			locks.retain(|_, lock| Arc::strong_count(lock) > 1);

			locks.entry(user_id.to_string()).or_default().clone()
		};

		lock.lock_owned().await
	}
}
