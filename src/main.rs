//! fetchcache - download and extraction cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use fetchcache::cli::{Cli, Commands};
use fetchcache::config::{Config, ConfigManager};
use fetchcache::error::FetchResult;
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

async fn run() -> FetchResult<()> {
    let cli = Cli::parse();

    // Load configuration first: it picks the log format
    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = match config_manager.load().await {
        Ok(config) => config,
        // `config init --force` must be able to repair a broken file
        Err(e) if matches!(cli.command, Commands::Config(_)) => {
            eprintln!("{} {}", style("Warning:").yellow().bold(), e);
            Config::default()
        }
        Err(e) => return Err(e),
    };

    // 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("fetchcache=warn"),
        1 => EnvFilter::new("fetchcache=info"),
        _ => EnvFilter::new("fetchcache=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    debug!("Using config {}", config_manager.path().display());

    match cli.command {
        Commands::Download(args) => fetchcache::cli::commands::download(args, &config).await,
        Commands::Extract(args) => fetchcache::cli::commands::extract(args, &config).await,
        Commands::Cache(args) => fetchcache::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            fetchcache::cli::commands::config(args, &config, &config_manager).await
        }
    }
}
