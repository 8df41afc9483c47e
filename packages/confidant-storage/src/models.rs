use time::OffsetDateTime;
use uuid::Uuid;

use confidant_domain::{
	credits::Plan,
	message::{Message, Role},
};

use crate::{Error, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
	pub message_id: Uuid,
	pub seq: i64,
	pub user_id: String,
	pub role: String,
	pub content: String,
	pub created_at: OffsetDateTime,
}
impl MessageRow {
	pub fn into_message(self) -> Result<Message> {
		let role: Role = self
			.role
			.parse()
			.map_err(|err| Error::InvalidArgument(format!("Stored message role: {err}")))?;

		Ok(Message {
			message_id: self.message_id,
			seq: self.seq,
			user_id: self.user_id,
			role,
			content: self.content,
			created_at: self.created_at,
		})
	}
}

/// A stored embedding joined with the ordering columns of its message.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageEmbeddingRow {
	pub message_id: Uuid,
	pub user_id: String,
	pub role: String,
	pub seq: i64,
	pub created_at: OffsetDateTime,
	pub vec_text: String,
}
impl MessageEmbeddingRow {
	pub fn vector(&self) -> Result<Vec<f32>> {
		crate::queries::parse_pg_vector(&self.vec_text)
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CreditAccountRow {
	pub user_id: String,
	pub plan: String,
	pub balance: i64,
	pub updated_at: OffsetDateTime,
}
impl CreditAccountRow {
	pub fn plan(&self) -> Result<Plan> {
		self.plan
			.parse()
			.map_err(|err| Error::InvalidArgument(format!("Stored credit plan: {err}")))
	}
}
