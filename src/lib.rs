pub mod anomaly;
pub mod cli;
pub mod config;
pub mod models;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Logs go to stderr; stdout carries the report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);

    cli::execute(cli)
}
