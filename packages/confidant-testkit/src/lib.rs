//! Throwaway Postgres databases and Qdrant collections for integration tests.

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr};

use qdrant_client::Qdrant;
use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use uuid::Uuid;

/// A database created for one test. Call [`TestDatabase::cleanup`] at the end of the test to
/// drop it together with every collection named after it.
pub struct TestDatabase {
	name: String,
	dsn: String,
	admin_options: PgConnectOptions,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base_options = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Invalid CONFIDANT_PG_DSN: {err}.")))?;
		let admin_options = base_options.clone().database("postgres");
		let mut admin = PgConnection::connect_with(&admin_options).await?;
		let name = format!("confidant_test_{}", Uuid::new_v4().simple());

		admin.execute(format!(r#"CREATE DATABASE "{name}""#).as_str()).await?;

		let dsn = base_options.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, admin_options })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	/// A collection name carrying this database's suffix, so cleanup can find it.
	pub fn collection_name(&self, prefix: &str) -> String {
		format!("{prefix}_{}", self.name)
	}

	pub async fn cleanup(self) -> Result<()> {
		let collections = self.drop_collections().await;
		let mut admin = PgConnection::connect_with(&self.admin_options).await?;

		sqlx::query(
			"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
		)
		.bind(&self.name)
		.fetch_all(&mut admin)
		.await?;
		admin.execute(format!(r#"DROP DATABASE IF EXISTS "{}""#, self.name).as_str()).await?;

		collections
	}

	async fn drop_collections(&self) -> Result<()> {
		let Some(url) = env_qdrant_url() else {
			return Ok(());
		};
		let client = Qdrant::from_url(&url).build()?;
		let suffix = format!("_{}", self.name);

		for collection in client.list_collections().await?.collections {
			if collection.name.ends_with(&suffix) {
				client.delete_collection(collection.name).await?;
			}
		}

		Ok(())
	}
}

pub fn env_dsn() -> Option<String> {
	env::var("CONFIDANT_PG_DSN").ok()
}

pub fn env_qdrant_url() -> Option<String> {
	env::var("CONFIDANT_QDRANT_URL").ok()
}
