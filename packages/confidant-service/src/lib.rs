pub mod backends;
pub mod credits;
pub mod duplicates;
pub mod generator;
pub mod pipeline;
pub mod refiner;
pub mod retriever;
pub mod store;

mod error;

pub use backends::Backends;
pub use duplicates::DuplicationCheck;
pub use error::{Error, Result};
pub use pipeline::{PipelineState, TurnLocks, TurnOutcome, TurnRequest, TurnResponse, TurnStage};
pub use refiner::Refinement;
pub use retriever::RetrievalQuery;
pub use store::{
	BackfillReport, FetchMessagesRequest, HistoryCursor, HistoryPage, RebuildReport,
	SaveMessageRequest, SaveMessageResponse,
};

use std::{future::Future, pin::Pin, sync::Arc};

use confidant_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use confidant_domain::{
	message::{ChatTurn, Reasoning},
	prompt,
};
use confidant_providers::{chat, embedding};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait ChatProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		turns: &'a [ChatTurn],
		reasoning: Option<Reasoning>,
	) -> BoxFuture<'a, Result<String>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub chat: Arc<dyn ChatProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, chat: Arc<dyn ChatProvider>) -> Self {
		Self { embedding, chat }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), chat: provider }
	}
}

pub struct ConfidantService {
	pub cfg: Config,
	pub providers: Providers,
	pub backends: Backends,
}
impl ConfidantService {
	pub fn new(cfg: Config, backends: Backends) -> Self {
		Self { cfg, providers: Providers::default(), backends }
	}

	pub fn with_providers(cfg: Config, backends: Backends, providers: Providers) -> Self {
		Self { cfg, providers, backends }
	}

	pub fn embedding_version(&self) -> String {
		embedding_version(&self.cfg)
	}

	pub fn persona(&self) -> &str {
		self.cfg.pipeline.persona.as_deref().unwrap_or(prompt::DEFAULT_PERSONA)
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			embedding::embed(cfg, texts)
				.await
				.map_err(|err| Error::Embedding { message: err.to_string() })
		})
	}
}
impl ChatProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		turns: &'a [ChatTurn],
		reasoning: Option<Reasoning>,
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			chat::complete(cfg, turns, reasoning)
				.await
				.map_err(|err| Error::Generation { message: err.to_string() })
		})
	}
}

/// `"{provider_id}:{model}:{dimensions}"`; embeddings from different versions never mix.
pub fn embedding_version(cfg: &Config) -> String {
	format!(
		"{}:{}:{}",
		cfg.providers.embedding.provider_id,
		cfg.providers.embedding.model,
		cfg.providers.embedding.dimensions,
	)
}
