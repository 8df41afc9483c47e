use crate::pipeline::TurnStage;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Embedding error: {message}")]
	Embedding { message: String },
	#[error("Search error: {message}")]
	Search { message: String },
	#[error("Generation error: {message}")]
	Generation { message: String },
	#[error("Refinement error: {message}")]
	Refinement { message: String },
	#[error("Persistence error: {message}")]
	Persistence { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Insufficient credits: {message}")]
	Credits { message: String },
	#[error("Invalid turn transition from {from} to {to}.")]
	InvalidTransition { from: TurnStage, to: TurnStage },
}
impl Error {
	pub(crate) fn invalid_request(message: impl Into<String>) -> Self {
		Self::InvalidRequest { message: message.into() }
	}
}
impl From<confidant_storage::Error> for Error {
	fn from(err: confidant_storage::Error) -> Self {
		Self::Persistence { message: err.to_string() }
	}
}
