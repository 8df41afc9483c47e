use std::{future::Future, time::Duration};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_backoff: Duration,
	pub max_backoff: Duration,
}
impl RetryPolicy {
	/// Exponential backoff doubling from the base, capped at the maximum.
	pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
		let exp = attempt.max(1).saturating_sub(1).min(16);
		let base = self.base_backoff.saturating_mul(1 << exp);

		base.min(self.max_backoff)
	}
}
impl From<&confidant_config::Retry> for RetryPolicy {
	fn from(cfg: &confidant_config::Retry) -> Self {
		Self {
			max_attempts: cfg.max_attempts.max(1),
			base_backoff: Duration::from_millis(cfg.base_backoff_ms),
			max_backoff: Duration::from_millis(cfg.max_backoff_ms),
		}
	}
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or attempts run out.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let mut attempt = 1;

	loop {
		match op().await {
			Ok(value) => return Ok(value),
			Err(err) if attempt < policy.max_attempts && err.is_retryable() => {
				let backoff = policy.backoff_for_attempt(attempt);

				tracing::warn!(
					provider_call = label,
					attempt,
					backoff_ms = backoff.as_millis() as u64,
					error = %err,
					"Provider call failed. Retrying."
				);
				tokio::time::sleep(backoff).await;

				attempt += 1;
			},
			Err(err) => return Err(err),
		}
	}
}

pub(crate) fn invalid_response(message: impl Into<String>) -> Error {
	Error::InvalidResponse { message: message.into() }
}
