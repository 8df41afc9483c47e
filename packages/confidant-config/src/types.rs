use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub retrieval: Retrieval,
	pub pipeline: Pipeline,
	#[serde(default)]
	pub history: History,
	#[serde(default)]
	pub credits: Credits,
	#[serde(default)]
	pub worker: Worker,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	#[serde(default = "default_storage_backend")]
	pub backend: String,
	pub postgres: Option<Postgres>,
	pub qdrant: Option<Qdrant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub chat: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	#[serde(default)]
	pub retry: Retry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	/// Omitted from the request body when unset so the backend default applies.
	pub temperature: Option<f32>,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	#[serde(default)]
	pub retry: Retry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Retry {
	pub max_attempts: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
}
impl Default for Retry {
	fn default() -> Self {
		Self { max_attempts: 3, base_backoff_ms: 250, max_backoff_ms: 4_000 }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Retrieval {
	/// Similar past user messages injected into the first-pass prompt.
	pub user_context: RetrievalScope,
	/// Similar past assistant replies used by the duplication check.
	pub assistant_duplicates: RetrievalScope,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetrievalScope {
	pub threshold: f32,
	pub limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pipeline {
	pub turn_budget_ms: u64,
	#[serde(default = "default_greeting")]
	pub greeting: String,
	#[serde(default = "default_fallback_reply")]
	pub fallback_reply: String,
	/// Replaces the built-in persona prompt when set.
	pub persona: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct History {
	pub default_page_size: u32,
	pub max_page_size: u32,
}
impl Default for History {
	fn default() -> Self {
		Self { default_page_size: 20, max_page_size: 100 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Credits {
	pub enabled: bool,
	pub cost_per_turn: i64,
	pub allowances: Allowances,
}
impl Default for Credits {
	fn default() -> Self {
		Self { enabled: false, cost_per_turn: 1, allowances: Allowances::default() }
	}
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Allowances {
	pub free: i64,
	pub pro: i64,
	pub premium: i64,
}
impl Default for Allowances {
	fn default() -> Self {
		Self { free: 100, pro: 2_999, premium: 9_990 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Worker {
	pub poll_interval_ms: u64,
	pub batch_size: u32,
}
impl Default for Worker {
	fn default() -> Self {
		Self { poll_interval_ms: 5_000, batch_size: 64 }
	}
}

fn default_storage_backend() -> String {
	"postgres".to_string()
}

fn default_greeting() -> String {
	"Hi, there! I'm Aisha, how are you today?".to_string()
}

fn default_fallback_reply() -> String {
	"Sorry, I could not generate a response.".to_string()
}
