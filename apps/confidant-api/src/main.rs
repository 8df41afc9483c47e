use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = confidant_api::Args::parse();

	confidant_api::run(args).await
}
