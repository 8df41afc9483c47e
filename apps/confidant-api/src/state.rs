use std::sync::Arc;

use confidant_service::{Backends, ConfidantService, TurnLocks};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<ConfidantService>,
	pub turn_locks: Arc<TurnLocks>,
}
impl AppState {
	pub async fn new(config: confidant_config::Config) -> color_eyre::Result<Self> {
		let backends = Backends::from_config(&config).await?;

		Ok(Self::from_service(ConfidantService::new(config, backends)))
	}

	pub fn from_service(service: ConfidantService) -> Self {
		Self { service: Arc::new(service), turn_locks: Arc::new(TurnLocks::default()) }
	}
}
