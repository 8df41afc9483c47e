use confidant_domain::credits::Plan;
use confidant_service::Error;

use super::{Harness, ScriptedChat, test_config};

#[tokio::test]
async fn new_users_start_on_the_free_allowance() {
	let harness = Harness::new(ScriptedChat::default());
	let balance = harness.service.balance("u1").await.expect("Balance failed.");

	assert_eq!(balance.plan, Plan::Free);
	assert_eq!(balance.remaining, Some(2));
}

#[tokio::test]
async fn free_allowance_is_exhausted_then_rejected() {
	let harness = Harness::new(ScriptedChat::default());

	for expected in [1, 0] {
		harness.service.ensure_turn_credit("u1").await.expect("Credit check failed.");

		let charged = harness.service.charge_turn("u1").await.expect("Charge failed.");

		assert_eq!(charged.and_then(|balance| balance.remaining), Some(expected));
	}

	let gate = harness.service.ensure_turn_credit("u1").await;
	let charge = harness.service.charge_turn("u1").await;

	assert!(matches!(gate, Err(Error::Credits { .. })));
	assert!(matches!(charge, Err(Error::Credits { .. })));
	let balance = harness.service.balance("u1").await.expect("Balance failed.");

	assert_eq!(balance.remaining, Some(0));
}

#[tokio::test]
async fn demo_accounts_are_never_debited() {
	let harness = Harness::new(ScriptedChat::default());
	let opened = harness.service.open_account("demo-user", Plan::Demo).await.expect("Open failed.");

	assert_eq!(opened.remaining, None);

	for _ in 0..5 {
		let charged = harness.service.charge_turn("demo-user").await.expect("Charge failed.");

		assert_eq!(charged.map(|balance| balance.plan), Some(Plan::Demo));
	}

	let balance = harness.service.balance("demo-user").await.expect("Balance failed.");

	assert_eq!(balance.plan, Plan::Demo);
	assert_eq!(balance.remaining, None);
}

#[tokio::test]
async fn opening_an_existing_account_keeps_its_plan() {
	let harness = Harness::new(ScriptedChat::default());

	harness.service.open_account("u1", Plan::Pro).await.expect("Open failed.");

	let reopened = harness.service.open_account("u1", Plan::Free).await.expect("Open failed.");

	assert_eq!(reopened.plan, Plan::Pro);
	assert_eq!(reopened.remaining, Some(2_999));
}

#[tokio::test]
async fn disabled_credits_skip_the_ledger() {
	let mut cfg = test_config();

	cfg.credits.enabled = false;

	let harness = Harness::with_config(cfg, ScriptedChat::default());

	for _ in 0..5 {
		assert_eq!(harness.service.ensure_turn_credit("u1").await.expect("Gate failed."), None);
		assert_eq!(harness.service.charge_turn("u1").await.expect("Charge failed."), None);
	}
}
