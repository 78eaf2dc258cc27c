//! autopkg-runner CLI entry point

use autopkg_runner::cli::{self, Cli};
use autopkg_runner::config::{ConfigManager, Settings};
use autopkg_runner::error::RunnerResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> RunnerResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    // --debug or -vv = debug, otherwise info
    let filter = if cli.debug || cli.verbose >= 2 {
        EnvFilter::new("autopkg_runner=debug")
    } else {
        EnvFilter::new("autopkg_runner=info")
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
    debug!("Loaded config from {}", config_manager.path().display());

    let settings = Settings::resolve(&config, &cli);
    cli::execute(&cli, &settings).await?;
    Ok(())
}
