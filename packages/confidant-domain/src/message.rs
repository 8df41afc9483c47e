use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Role of a persisted message. System instructions are never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	User,
	Assistant,
}
impl Role {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::User => "user",
			Self::Assistant => "assistant",
		}
	}
}
impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for Role {
	type Err = UnknownRole;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"user" => Ok(Self::User),
			"assistant" => Ok(Self::Assistant),
			other => Err(UnknownRole(other.to_string())),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown message role {0:?}.")]
pub struct UnknownRole(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
	System,
	User,
	Assistant,
}

/// One turn as sent to the language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
	pub role: ChatRole,
	pub content: String,
}
impl ChatTurn {
	pub fn system(content: impl Into<String>) -> Self {
		Self { role: ChatRole::System, content: content.into() }
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self { role: ChatRole::User, content: content.into() }
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self { role: ChatRole::Assistant, content: content.into() }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
	Low,
	High,
}

/// Forwarded verbatim to the chat backend as `"reasoning": {"effort": ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reasoning {
	pub effort: ReasoningEffort,
}

/// A stored chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
	pub message_id: Uuid,
	/// Store-assigned insertion order; breaks timestamp ties.
	pub seq: i64,
	pub user_id: String,
	pub role: Role,
	pub content: String,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}

/// A retrieved message with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedMessage {
	pub message: Message,
	pub similarity: f32,
}
