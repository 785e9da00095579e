//! HTTP service for price lookups and narration audio

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use crypto_narrator::config::{AppConfig, DEFAULT_CONFIG_PATH};
use crypto_narrator::logging::init_logging;
use crypto_narrator::web::{self, AppState};

/// Crypto Narrator web API
#[derive(Parser, Debug)]
#[command(name = "crypto-narrator-web")]
#[command(about = "Serves cryptocurrency prices and narration audio over HTTP")]
#[command(version)]
struct Args {
    /// Host to run the server on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to run the server on
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to the configuration file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        }
    };
    init_logging(&config.logging.level, args.debug);

    let state = match AppState::from_config(&config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize app state: {}", e);
            return ExitCode::from(1);
        }
    };
    let app = web::router(state);

    let address = format!("{}:{}", args.host, args.port);
    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", address, e);
            return ExitCode::from(1);
        }
    };

    info!("Crypto Narrator web API listening on http://{}", address);
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}
