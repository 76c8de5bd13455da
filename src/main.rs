//! netdiag - network connectivity diagnosis
//!
//! CLI entry point.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "netdiag=info,netdiag_core=info,netdiag_tools=info".into());
    // Logs go to stderr so `--json` output stays parseable.
    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        cli::LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        cli::LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    let config = app::load_config()?;
    debug!(?config, "Configuration loaded");

    cli::run(cli, config).await
}
