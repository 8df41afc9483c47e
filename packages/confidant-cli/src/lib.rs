//! Pieces shared by the confidant binaries: clap styling, the config flag, log setup.

use std::path::PathBuf;

use clap::{
	Args,
	builder::{
		Styles,
		styling::{AnsiColor, Effects},
	},
};
use tracing_subscriber::EnvFilter;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const FALLBACK_LOG_LEVEL: &str = "info";

#[derive(Debug, Args)]
pub struct ConfigArgs {
	/// Path to the confidant TOML config.
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.literal(AnsiColor::Magenta.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
}

/// An unparsable level falls back to `info` rather than failing startup.
pub fn log_filter(log_level: &str) -> EnvFilter {
	EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new(FALLBACK_LOG_LEVEL))
}

pub fn init_tracing(log_level: &str) {
	tracing_subscriber::fmt().with_env_filter(log_filter(log_level)).init();
}
