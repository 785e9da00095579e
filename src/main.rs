//! Crypto Narrator - fetch cryptocurrency prices and narrate them
//!
//! Exit codes: 0 on success, 1 when the configuration is missing or invalid,
//! 2 when fetching or narration failed.

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};

use crypto_narrator::cli::{self, Cli, RunRequest, EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_SUCCESS};
use crypto_narrator::config::AppConfig;
use crypto_narrator::data::{FetcherSettings, PriceFetcher};
use crypto_narrator::logging::init_logging;
use crypto_narrator::narrator::Narrator;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    init_logging(&config.logging.level, cli.debug);
    debug!("Using configuration from '{}'", cli.config.display());

    let request = match RunRequest::from_cli(&cli, &config) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let mut fetcher = match PriceFetcher::new(FetcherSettings::from(&config)) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let mut narrator = match Narrator::from_config(&config) {
        Ok(narrator) => narrator,
        Err(e) => {
            error!("Failed to create speech client: {}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    if cli::run(&request, &mut fetcher, &mut narrator).await {
        ExitCode::from(EXIT_SUCCESS)
    } else {
        ExitCode::from(EXIT_FAILURE)
    }
}
