use confidant_domain::{message::Role, similarity};
use confidant_service::RetrievalQuery;

use super::{Harness, ScriptedChat, TEST_DIM, hash_embed};

fn query<'a>(
	text: &'a str,
	user_id: &'a str,
	role: Option<Role>,
	threshold: f32,
) -> RetrievalQuery<'a> {
	RetrievalQuery { text, user_id, role, threshold, limit: 10 }
}

#[test]
fn embedding_is_deterministic() {
	let a = hash_embed("Ughhh I miss ur brain 😩", TEST_DIM as usize);
	let b = hash_embed("Ughhh I miss ur brain 😩", TEST_DIM as usize);

	assert!((similarity::cosine(&a, &b) - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn embedding_failure_yields_no_results() {
	let harness = Harness::new(ScriptedChat::default());

	harness.save("u1", Role::User, "pizza night").await;
	harness.embedding.set_failing(true);

	let hits = harness.service.find_similar(query("pizza night", "u1", None, 0.0)).await;

	assert!(hits.is_empty());
}

#[tokio::test]
async fn raising_threshold_never_adds_results() {
	let harness = Harness::new(ScriptedChat::default());

	for text in [
		"pizza night with friends",
		"pizza is life",
		"friends are the best",
		"quantum chromodynamics lecture",
		"late night pizza cravings",
	] {
		harness.save("u1", Role::User, text).await;
	}

	let mut previous = usize::MAX;

	for threshold in [-1.0, 0.0, 0.2, 0.4, 0.6, 0.8, 1.0] {
		let count = harness
			.service
			.find_similar(query("pizza night with friends", "u1", None, threshold))
			.await
			.len();

		assert!(count <= previous, "threshold {threshold} returned more results");

		previous = count;
	}
}

#[tokio::test]
async fn role_scope_is_respected() {
	let harness = Harness::new(ScriptedChat::default());

	harness.save("u1", Role::User, "same words here").await;
	harness.save("u1", Role::Assistant, "same words here").await;

	let assistant = harness
		.service
		.find_similar(query("same words here", "u1", Some(Role::Assistant), 0.3))
		.await;
	let user =
		harness.service.find_similar(query("same words here", "u1", Some(Role::User), 0.3)).await;
	let both = harness.service.find_similar(query("same words here", "u1", None, 0.3)).await;

	assert_eq!(assistant.len(), 1);
	assert!(assistant.iter().all(|hit| hit.message.role == Role::Assistant));
	assert_eq!(user.len(), 1);
	assert!(user.iter().all(|hit| hit.message.role == Role::User));
	assert_eq!(both.len(), 2);
}

#[tokio::test]
async fn other_users_are_never_returned() {
	let harness = Harness::new(ScriptedChat::default());

	harness.save("u2", Role::User, "my secret is exactly this").await;
	harness.save("u1", Role::User, "something about secrets").await;

	let hits =
		harness.service.find_similar(query("my secret is exactly this", "u1", None, -1.0)).await;

	assert!(hits.iter().all(|hit| hit.message.user_id == "u1"));
	assert!(!hits.iter().any(|hit| hit.message.content == "my secret is exactly this"));
}

#[tokio::test]
async fn ties_prefer_the_most_recent_message() {
	let harness = Harness::new(ScriptedChat::default());

	harness.save("u1", Role::User, "repeat after me").await;
	harness.save("u1", Role::User, "repeat after me").await;

	let hits = harness.service.find_similar(query("repeat after me", "u1", None, 0.3)).await;

	assert_eq!(hits.len(), 2);
	assert!(hits[0].message.seq > hits[1].message.seq);
}

#[tokio::test]
async fn results_are_ranked_and_truncated() {
	let harness = Harness::new(ScriptedChat::default());

	for text in ["coffee", "coffee beans", "coffee beans roasted dark", "tea"] {
		harness.save("u1", Role::User, text).await;
	}

	let hits = harness
		.service
		.find_similar(RetrievalQuery {
			text: "coffee beans",
			user_id: "u1",
			role: None,
			threshold: 0.0,
			limit: 2,
		})
		.await;

	assert_eq!(hits.len(), 2);
	assert_eq!(hits[0].message.content, "coffee beans");
	assert!(hits[0].similarity >= hits[1].similarity);
}

#[tokio::test]
async fn blank_query_and_zero_limit_skip_the_backends() {
	let harness = Harness::new(ScriptedChat::default());
	let blank = harness.service.find_similar(query("   ", "u1", None, 0.0)).await;
	let zero = harness
		.service
		.find_similar(RetrievalQuery {
			text: "hello",
			user_id: "u1",
			role: None,
			threshold: 0.0,
			limit: 0,
		})
		.await;

	assert!(blank.is_empty());
	assert!(zero.is_empty());
	assert_eq!(harness.embedding.count(), 0);
}
