//! Linkcache - link-step cache wrapper
//!
//! CLI entry point. Exits with the wrapped command's status, or 0 on a
//! cache hit.

use clap::Parser;
use console::style;
use linkcache::cli::Cli;
use linkcache::config::{Config, ConfigManager};
use linkcache::error::LinkcacheResult;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(status) => ExitCode::from(u8::try_from(status).unwrap_or(1)),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> LinkcacheResult<i32> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    // A broken config file must not break every link step
    let config = match config_manager.load().await {
        Ok(config) => config,
        Err(e) => {
            warn!("{}; using defaults", e);
            Config::default()
        }
    };

    linkcache::cli::execute(cli, &config).await
}
