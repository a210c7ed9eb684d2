//! `proxgate`: runs every configured door until interrupted.

mod app;
mod settings;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "proxgate", version, about = "Proximity card door controller")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "PROXGATE_CONFIG", default_value = "proxgate.toml")]
    config: PathBuf,

    /// Log level, overriding the configuration (RUST_LOG wins over both)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    init_tracing(cli.log_level.as_deref().unwrap_or(&settings.log_level));
    settings.validate().context("invalid configuration")?;

    if cli.check {
        tracing::info!(doors = settings.doors.len(), "configuration is valid");
        return Ok(());
    }

    app::run(settings).await
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}
