pub mod worker;

use clap::Parser;

use confidant_cli::ConfigArgs;
use confidant_service::{Backends, ConfidantService};

#[derive(Debug, Parser)]
#[command(
	version = confidant_cli::VERSION,
	rename_all = "kebab",
	styles = confidant_cli::styles(),
)]
pub struct Args {
	#[command(flatten)]
	pub config: ConfigArgs,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = confidant_config::load(&args.config.config)?;

	confidant_cli::init_tracing(&config.service.log_level);

	let backends = Backends::from_config(&config).await?;
	let state = worker::WorkerState::from_config(&config);
	let service = ConfidantService::new(config, backends);

	worker::run_worker(&service, state).await
}
