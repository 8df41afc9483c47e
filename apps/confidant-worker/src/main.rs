use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = confidant_worker::Args::parse();

	confidant_worker::run(args).await
}
