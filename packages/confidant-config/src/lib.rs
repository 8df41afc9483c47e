mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Allowances, Config, Credits, EmbeddingProviderConfig, History, LlmProviderConfig, Pipeline,
	Postgres, Providers, Qdrant, Retrieval, RetrievalScope, Retry, Service, Storage, Worker,
};

use std::{fs, path::Path};

pub const BACKEND_POSTGRES: &str = "postgres";
pub const BACKEND_MEMORY: &str = "memory";

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse_with_path(&raw, path)
}

pub fn parse(raw: &str) -> Result<Config> {
	parse_with_path(raw, Path::new("<inline>"))
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.admin_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.admin_bind must be non-empty.".to_string(),
		});
	}

	validate_storage(cfg)?;
	validate_providers(cfg)?;

	for (label, scope) in [
		("retrieval.user_context", &cfg.retrieval.user_context),
		("retrieval.assistant_duplicates", &cfg.retrieval.assistant_duplicates),
	] {
		if !scope.threshold.is_finite() {
			return Err(Error::Validation {
				message: format!("{label}.threshold must be a finite number."),
			});
		}
		if !(-1.0..=1.0).contains(&scope.threshold) {
			return Err(Error::Validation {
				message: format!("{label}.threshold must be in the range -1.0-1.0."),
			});
		}
		if scope.limit == 0 {
			return Err(Error::Validation {
				message: format!("{label}.limit must be greater than zero."),
			});
		}
	}

	if cfg.pipeline.turn_budget_ms == 0 {
		return Err(Error::Validation {
			message: "pipeline.turn_budget_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.pipeline.fallback_reply.trim().is_empty() {
		return Err(Error::Validation {
			message: "pipeline.fallback_reply must be non-empty.".to_string(),
		});
	}
	if cfg.history.default_page_size == 0 {
		return Err(Error::Validation {
			message: "history.default_page_size must be greater than zero.".to_string(),
		});
	}
	if cfg.history.max_page_size < cfg.history.default_page_size {
		return Err(Error::Validation {
			message: "history.max_page_size must be at least history.default_page_size."
				.to_string(),
		});
	}
	if cfg.credits.cost_per_turn <= 0 {
		return Err(Error::Validation {
			message: "credits.cost_per_turn must be greater than zero.".to_string(),
		});
	}

	let allowances = &cfg.credits.allowances;

	if allowances.free < 0 || allowances.pro < 0 || allowances.premium < 0 {
		return Err(Error::Validation {
			message: "credits.allowances must be zero or greater.".to_string(),
		});
	}
	if cfg.worker.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "worker.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.batch_size == 0 {
		return Err(Error::Validation {
			message: "worker.batch_size must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn parse_with_path(raw: &str, path: &Path) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

fn validate_storage(cfg: &Config) -> Result<()> {
	match cfg.storage.backend.as_str() {
		BACKEND_MEMORY => Ok(()),
		BACKEND_POSTGRES => {
			let Some(postgres) = cfg.storage.postgres.as_ref() else {
				return Err(Error::Validation {
					message: "storage.postgres is required when storage.backend is postgres."
						.to_string(),
				});
			};
			let Some(qdrant) = cfg.storage.qdrant.as_ref() else {
				return Err(Error::Validation {
					message: "storage.qdrant is required when storage.backend is postgres."
						.to_string(),
				});
			};

			if postgres.dsn.trim().is_empty() {
				return Err(Error::Validation {
					message: "storage.postgres.dsn must be non-empty.".to_string(),
				});
			}
			if postgres.pool_max_conns == 0 {
				return Err(Error::Validation {
					message: "storage.postgres.pool_max_conns must be greater than zero."
						.to_string(),
				});
			}
			if qdrant.collection.trim().is_empty() {
				return Err(Error::Validation {
					message: "storage.qdrant.collection must be non-empty.".to_string(),
				});
			}
			if cfg.providers.embedding.dimensions != qdrant.vector_dim {
				return Err(Error::Validation {
					message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
						.to_string(),
				});
			}

			Ok(())
		},
		_ => Err(Error::Validation {
			message: "storage.backend must be one of postgres or memory.".to_string(),
		}),
	}
}

fn validate_providers(cfg: &Config) -> Result<()> {
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}

	for (label, key) in
		[("embedding", &cfg.providers.embedding.api_key), ("chat", &cfg.providers.chat.api_key)]
	{
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}
	for (label, retry) in
		[("embedding", &cfg.providers.embedding.retry), ("chat", &cfg.providers.chat.retry)]
	{
		if retry.max_attempts == 0 {
			return Err(Error::Validation {
				message: format!("providers.{label}.retry.max_attempts must be greater than zero."),
			});
		}
		if retry.max_backoff_ms < retry.base_backoff_ms {
			return Err(Error::Validation {
				message: format!(
					"providers.{label}.retry.max_backoff_ms must be at least base_backoff_ms."
				),
			});
		}
	}

	if let Some(temperature) = cfg.providers.chat.temperature
		&& (!temperature.is_finite() || temperature < 0.0)
	{
		return Err(Error::Validation {
			message: "providers.chat.temperature must be a finite number, zero or greater."
				.to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.pipeline.persona.as_deref().map(|persona| persona.trim().is_empty()).unwrap_or(false) {
		cfg.pipeline.persona = None;
	}

	cfg.storage.backend = cfg.storage.backend.trim().to_ascii_lowercase();
}
