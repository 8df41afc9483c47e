use confidant_domain::credits::Plan;

use crate::{Result, db::Db, models::CreditAccountRow};

/// Opens the account on first sight. An existing account is returned unchanged.
pub async fn ensure_account(
	db: &Db,
	user_id: &str,
	plan: Plan,
	opening_balance: i64,
) -> Result<CreditAccountRow> {
	sqlx::query(
		"\
INSERT INTO credit_accounts (user_id, plan, balance)
VALUES ($1, $2, $3)
ON CONFLICT (user_id) DO NOTHING",
	)
	.bind(user_id)
	.bind(plan.as_str())
	.bind(opening_balance)
	.execute(&db.pool)
	.await?;

	let row = sqlx::query_as::<_, CreditAccountRow>(
		"\
SELECT user_id, plan, balance, updated_at
FROM credit_accounts
WHERE user_id = $1",
	)
	.bind(user_id)
	.fetch_one(&db.pool)
	.await?;

	Ok(row)
}

/// Atomically debits `amount`. Returns the new balance, or `None` when the balance is too low.
pub async fn debit(db: &Db, user_id: &str, amount: i64) -> Result<Option<i64>> {
	let balance = sqlx::query_scalar::<_, i64>(
		"\
UPDATE credit_accounts
SET balance = balance - $2, updated_at = now()
WHERE user_id = $1 AND balance >= $2
RETURNING balance",
	)
	.bind(user_id)
	.bind(amount)
	.fetch_optional(&db.pool)
	.await?;

	Ok(balance)
}
