use std::sync::Arc;

use confidant_config::{BACKEND_POSTGRES, Postgres, Qdrant};
use confidant_domain::{credits::Plan, message::Role};
use confidant_service::{
	Backends, ConfidantService, FetchMessagesRequest, Providers, RetrievalQuery,
	SaveMessageRequest,
};
use confidant_testkit::TestDatabase;

use super::{HashEmbedding, ScriptedChat, TEST_DIM, test_config};

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set CONFIDANT_PG_DSN and CONFIDANT_QDRANT_URL to run."]
async fn postgres_backends_round_trip_a_conversation() {
	let (Some(base_dsn), Some(qdrant_url)) =
		(confidant_testkit::env_dsn(), confidant_testkit::env_qdrant_url())
	else {
		eprintln!(
			"Skipping postgres_backends_round_trip_a_conversation; set CONFIDANT_PG_DSN and CONFIDANT_QDRANT_URL to run."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let mut cfg = test_config();

	cfg.storage.backend = BACKEND_POSTGRES.to_string();
	cfg.storage.postgres = Some(Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 });
	cfg.storage.qdrant = Some(Qdrant {
		url: qdrant_url,
		collection: test_db.collection_name("confidant_acceptance"),
		vector_dim: TEST_DIM,
	});

	let backends = Backends::from_config(&cfg).await.expect("Failed to connect backends.");
	let providers =
		Providers::new(Arc::new(HashEmbedding::default()), Arc::new(ScriptedChat::default()));
	let service = ConfidantService::with_providers(cfg, backends, providers);

	for (role, content) in [
		(Role::User, "tell me about the northern lights"),
		(Role::Assistant, "Green skies and cold toes, worth it 🌌"),
		(Role::User, "what about the midnight sun"),
	] {
		let saved = service
			.save_message(SaveMessageRequest {
				user_id: "u1".to_string(),
				role,
				content: content.to_string(),
			})
			.await
			.expect("Failed to save message.");

		assert!(saved.embedded);
	}

	let page = service
		.fetch_messages(FetchMessagesRequest {
			user_id: "u1".to_string(),
			limit: Some(2),
			..Default::default()
		})
		.await
		.expect("Failed to fetch history.");

	assert_eq!(page.messages.len(), 2);
	assert!(page.has_more);
	assert_eq!(page.messages[1].content, "what about the midnight sun");

	let hits = service
		.find_similar(RetrievalQuery {
			text: "Green skies and cold toes, worth it 🌌",
			user_id: "u1",
			role: Some(Role::Assistant),
			threshold: 0.9,
			limit: 5,
		})
		.await;

	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].message.role, Role::Assistant);

	let rebuilt = service.rebuild_index().await.expect("Failed to rebuild index.");

	assert_eq!(rebuilt.indexed, 3);

	service.open_account("u1", Plan::Free).await.expect("Failed to open account.");

	let charged = service.charge_turn("u1").await.expect("Failed to charge turn.");

	assert_eq!(charged.and_then(|balance| balance.remaining), Some(1));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
