use confidant_domain::credits::{CreditBalance, Plan};

use crate::{ConfidantService, Error, Result, backends::CreditAccount};

impl ConfidantService {
	/// Opens an account on `plan` unless one exists. New users otherwise start on the free plan.
	pub async fn open_account(&self, user_id: &str, plan: Plan) -> Result<CreditBalance> {
		if user_id.trim().is_empty() {
			return Err(Error::invalid_request("user_id must be non-empty."));
		}

		let opening_balance = plan.allowance(&self.cfg.credits.allowances).unwrap_or(0);
		let account = self.backends.credits.open_account(user_id, plan, opening_balance).await?;

		Ok(balance_of(&account))
	}

	pub async fn balance(&self, user_id: &str) -> Result<CreditBalance> {
		self.open_account(user_id, Plan::Free).await
	}

	/// Rejects the turn up front when credits are enforced and the balance cannot cover it.
	pub async fn ensure_turn_credit(&self, user_id: &str) -> Result<Option<CreditBalance>> {
		if !self.cfg.credits.enabled {
			return Ok(None);
		}

		let balance = self.balance(user_id).await?;

		match balance.remaining {
			Some(remaining) if remaining < self.cfg.credits.cost_per_turn =>
				Err(Error::Credits { message: format!("Balance {remaining} cannot cover a turn.") }),
			_ => Ok(Some(balance)),
		}
	}

	/// Debits one turn. Unlimited plans are never debited.
	pub async fn charge_turn(&self, user_id: &str) -> Result<Option<CreditBalance>> {
		if !self.cfg.credits.enabled {
			return Ok(None);
		}

		let balance = self.balance(user_id).await?;

		if balance.plan.is_unlimited() {
			return Ok(Some(balance));
		}

		let cost = self.cfg.credits.cost_per_turn;
		let Some(remaining) = self.backends.credits.debit(user_id, cost).await? else {
			return Err(Error::Credits {
				message: "Balance was exhausted by a concurrent turn.".to_string(),
			});
		};

		tracing::debug!(user_id, remaining, "Turn charged.");

		Ok(Some(CreditBalance { plan: balance.plan, remaining: Some(remaining) }))
	}
}

fn balance_of(account: &CreditAccount) -> CreditBalance {
	let remaining = if account.plan.is_unlimited() { None } else { Some(account.balance) };

	CreditBalance { plan: account.plan, remaining }
}
