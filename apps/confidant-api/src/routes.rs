use axum::{
	Json, Router,
	extract::{Query, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};

use confidant_domain::{
	credits::{CreditBalance, Plan},
	message::Role,
	prompt,
};
use confidant_service::{
	BackfillReport, ConfidantService, Error, FetchMessagesRequest, HistoryPage, RebuildReport,
	SaveMessageRequest, SaveMessageResponse, TurnOutcome, TurnRequest,
};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/chat/turn", post(chat_turn))
		.route("/v1/messages", post(save_message).get(list_messages))
		.route("/v1/credits", get(credits))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/reindex", post(reindex))
		.route("/v1/admin/backfill", post(backfill))
		.with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ChatTurnResponse {
	pub reply: String,
	pub outcome: TurnOutcome,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub balance: Option<CreditBalance>,
}

#[derive(Debug, Deserialize)]
pub struct CreditsQuery {
	pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
	pub user_id: String,
	pub plan: Plan,
	/// `None` for unlimited plans.
	pub balance: Option<i64>,
	pub unlimited: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct BackfillQuery {
	pub batch: Option<u32>,
}

async fn health() -> StatusCode {
	StatusCode::OK
}

/// Runs one turn while holding the user's turn lock. The lock is released only after the
/// background task has stored the user message and the reply.
async fn chat_turn(
	State(state): State<AppState>,
	Json(payload): Json<TurnRequest>,
) -> Result<Json<ChatTurnResponse>, ApiError> {
	let guard = state.turn_locks.acquire(&payload.user_id).await;

	state.service.ensure_turn_credit(&payload.user_id).await?;

	let user_id = payload.user_id.clone();
	let user_message = prompt::current_user_message(&payload.messages).map(str::to_string);
	let turn = state.service.run_turn(payload).await?;
	let fell_back = turn.outcome == TurnOutcome::Fallback;
	let balance = if fell_back {
		None
	} else {
		match state.service.charge_turn(&user_id).await {
			Ok(balance) => balance,
			Err(err) => {
				tracing::warn!(user_id = %user_id, error = %err, "Failed to charge turn.");

				None
			},
		}
	};
	let reply = (!fell_back).then(|| turn.reply.clone());
	let service = state.service.clone();

	tokio::spawn(async move {
		let _guard = guard;

		persist_turn(&service, &user_id, user_message, reply).await;
	});

	Ok(Json(ChatTurnResponse { reply: turn.reply, outcome: turn.outcome, balance }))
}

async fn save_message(
	State(state): State<AppState>,
	Json(payload): Json<SaveMessageRequest>,
) -> Result<Json<SaveMessageResponse>, ApiError> {
	let response = state.service.save_message(payload).await?;

	Ok(Json(response))
}

async fn list_messages(
	State(state): State<AppState>,
	Query(query): Query<FetchMessagesRequest>,
) -> Result<Json<HistoryPage>, ApiError> {
	let response = state.service.fetch_messages(query).await?;

	Ok(Json(response))
}

async fn credits(
	State(state): State<AppState>,
	Query(query): Query<CreditsQuery>,
) -> Result<Json<CreditsResponse>, ApiError> {
	let balance = state.service.balance(&query.user_id).await?;

	Ok(Json(CreditsResponse {
		user_id: query.user_id,
		plan: balance.plan,
		balance: balance.remaining,
		unlimited: balance.plan.is_unlimited(),
	}))
}

async fn reindex(State(state): State<AppState>) -> Result<Json<RebuildReport>, ApiError> {
	let response = state.service.rebuild_index().await?;

	Ok(Json(response))
}

async fn backfill(
	State(state): State<AppState>,
	Query(query): Query<BackfillQuery>,
) -> Result<Json<BackfillReport>, ApiError> {
	let batch = query.batch.unwrap_or(state.service.cfg.worker.batch_size);
	let response = state.service.backfill_embeddings(batch).await?;

	Ok(Json(response))
}

/// Stores the user message, then the reply. Failures are logged and never reach the caller.
async fn persist_turn(
	service: &ConfidantService,
	user_id: &str,
	user_message: Option<String>,
	reply: Option<String>,
) {
	let messages = [(Role::User, user_message), (Role::Assistant, reply)];

	for (role, content) in messages {
		let Some(content) = content else {
			continue;
		};
		let request = SaveMessageRequest { user_id: user_id.to_string(), role, content };

		if let Err(err) = service.save_message(request).await {
			tracing::error!(user_id, %role, error = %err, "Failed to persist turn message.");
		}
	}
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		let message = err.to_string();

		match err {
			Error::InvalidRequest { .. } =>
				Self::new(StatusCode::BAD_REQUEST, "invalid_request", message),
			Error::Credits { .. } =>
				Self::new(StatusCode::PAYMENT_REQUIRED, "insufficient_credits", message),
			Error::Persistence { .. } =>
				Self::new(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", message),
			Error::Embedding { .. }
			| Error::Search { .. }
			| Error::Generation { .. }
			| Error::Refinement { .. } =>
				Self::new(StatusCode::INTERNAL_SERVER_ERROR, "provider_error", message),
			Error::InvalidTransition { .. } =>
				Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message),
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		if self.status.is_server_error() {
			tracing::error!(
				error_code = %self.error_code,
				detail = %self.message,
				"Request failed."
			);
		}

		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
