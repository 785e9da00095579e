//! Command-line interface for crypto-narrator
//!
//! This module parses CLI arguments with clap, turns them into a [`RunRequest`]
//! with configuration fallbacks applied, and runs that request against a
//! [`PriceFetcher`] and a [`Narrator`].

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;
use tracing::{error, info};

use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use crate::data::{display_name, windows_from_flags, ChangeWindow, PriceFetcher, PriceResult};
use crate::narrator::{text, NarrationOptions, Narrator};

/// Process exit code on success
pub const EXIT_SUCCESS: u8 = 0;
/// Process exit code when the configuration is missing or invalid
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Process exit code when fetching or narration failed
pub const EXIT_FAILURE: u8 = 2;

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// `--cryptos` was given but contained no ids
    #[error("No cryptocurrencies given to --cryptos")]
    EmptyCryptoList,

    /// An id or code argument was blank
    #[error("--{0} must not be empty")]
    EmptyValue(&'static str),

    /// `--history` needs at least one day
    #[error("Invalid history span: {0} days (must be at least 1)")]
    InvalidHistoryDays(u32),
}

/// Crypto Narrator - fetch cryptocurrency prices and read them aloud
#[derive(Parser, Debug)]
#[command(name = "crypto-narrator")]
#[command(about = "Fetches cryptocurrency prices and narrates them")]
#[command(version)]
pub struct Cli {
    /// CoinGecko id of the cryptocurrency (e.g. bitcoin, ethereum, solana)
    #[arg(long, value_name = "ID", conflicts_with = "cryptos")]
    pub crypto: Option<String>,

    /// Comma-separated CoinGecko ids to narrate in one run
    ///
    /// Example:
    ///   crypto-narrator --cryptos bitcoin,ethereum,solana
    #[arg(long, value_name = "ID,ID,...", value_delimiter = ',')]
    pub cryptos: Option<Vec<String>>,

    /// Quote currency code (e.g. usd, eur)
    #[arg(long, value_name = "CODE")]
    pub currency: Option<String>,

    /// Narration language code (e.g. en, fr, de)
    #[arg(long, value_name = "LANG")]
    pub lang: Option<String>,

    /// Speak slowly
    #[arg(long, overrides_with = "no_slow")]
    pub slow: bool,

    /// Speak at normal speed, overriding the configuration
    #[arg(long = "no-slow", overrides_with = "slow")]
    pub no_slow: bool,

    /// Include the 24 hour price change
    #[arg(long = "with-24h-change")]
    pub with_24h_change: bool,

    /// Include the 7 day price change
    #[arg(long = "with-7d-change")]
    pub with_7d_change: bool,

    /// Include the 30 day price change
    #[arg(long = "with-30d-change")]
    pub with_30d_change: bool,

    /// Generate fresh audio instead of reusing cached narration
    #[arg(long)]
    pub force_new: bool,

    /// Skip the introductory sentence when narrating several prices
    #[arg(long)]
    pub no_intro: bool,

    /// Narrate the price range over the last DAYS days instead of the current price
    #[arg(long, value_name = "DAYS", conflicts_with = "cryptos")]
    pub history: Option<u32>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Path to the configuration file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

/// Which assets a run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Single(String),
    Multiple(Vec<String>),
}

/// Everything a run needs, with configuration fallbacks applied
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub target: Target,
    pub currency: String,
    pub windows: BTreeSet<ChangeWindow>,
    pub options: NarrationOptions,
    pub narrate_intro: bool,
    pub history_days: Option<u32>,
}

impl RunRequest {
    /// Creates a RunRequest from parsed CLI arguments.
    ///
    /// # Arguments
    /// * `cli` - The parsed CLI struct
    /// * `config` - Loaded configuration supplying defaults
    ///
    /// # Returns
    /// * `Ok(RunRequest)` ready to run
    /// * `Err(CliError)` if an argument value is unusable
    pub fn from_cli(cli: &Cli, config: &AppConfig) -> Result<Self, CliError> {
        let target = match (&cli.crypto, &cli.cryptos) {
            (_, Some(ids)) => {
                let ids = normalize_ids(ids);
                if ids.is_empty() {
                    return Err(CliError::EmptyCryptoList);
                }
                Target::Multiple(ids)
            }
            (Some(id), None) => Target::Single(non_empty(id, "crypto")?),
            (None, None) => Target::Single(config.defaults.crypto_id.to_lowercase()),
        };

        let currency = match &cli.currency {
            Some(code) => non_empty(code, "currency")?,
            None => config.defaults.vs_currency.to_lowercase(),
        };

        let lang = match &cli.lang {
            Some(lang) => non_empty(lang, "lang")?,
            None => config.narration.lang.clone(),
        };

        let slow = if cli.slow {
            true
        } else if cli.no_slow {
            false
        } else {
            config.narration.slow
        };

        if let Some(0) = cli.history {
            return Err(CliError::InvalidHistoryDays(0));
        }

        Ok(RunRequest {
            target,
            currency,
            windows: windows_from_flags(cli.with_24h_change, cli.with_7d_change, cli.with_30d_change),
            options: NarrationOptions {
                lang,
                slow,
                force_new: cli.force_new,
                keep_on_error: config.narration.keep_audio_on_error,
            },
            narrate_intro: !cli.no_intro,
            history_days: cli.history,
        })
    }
}

fn non_empty(value: &str, name: &'static str) -> Result<String, CliError> {
    let value = value.trim().to_lowercase();
    if value.is_empty() {
        Err(CliError::EmptyValue(name))
    } else {
        Ok(value)
    }
}

/// Lowercases ids and drops blanks and repeats, keeping the given order
fn normalize_ids(ids: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for id in ids {
        let id = id.trim().to_lowercase();
        if !id.is_empty() && !normalized.contains(&id) {
            normalized.push(id);
        }
    }
    normalized
}

/// Runs a request: fetch, print, narrate.
///
/// # Returns
/// * `true` when every requested asset was fetched and narrated
/// * `false` otherwise (details are logged)
pub async fn run(request: &RunRequest, fetcher: &mut PriceFetcher, narrator: &mut Narrator) -> bool {
    match (&request.target, request.history_days) {
        (Target::Single(id), Some(days)) => run_history(id, days, request, fetcher, narrator).await,
        (Target::Single(id), None) => run_single(id, request, fetcher, narrator).await,
        (Target::Multiple(ids), _) => run_multiple(ids, request, fetcher, narrator).await,
    }
}

async fn run_single(id: &str, request: &RunRequest, fetcher: &mut PriceFetcher, narrator: &mut Narrator) -> bool {
    println!(
        "Fetching price for {} in {}...",
        display_name(id),
        request.currency.to_uppercase()
    );

    let result = if request.windows.is_empty() {
        fetcher.fetch_price(id, &request.currency).await
    } else {
        fetcher
            .fetch_price_with_change(id, &request.currency, &request.windows)
            .await
    };

    if !result.success {
        println!("Could not retrieve price information for {}.", display_name(id));
        return false;
    }
    print_result(&result, &request.windows);
    narrator
        .narrate_price_with_change(&result, &request.windows, &request.options)
        .await
}

async fn run_multiple(
    ids: &[String],
    request: &RunRequest,
    fetcher: &mut PriceFetcher,
    narrator: &mut Narrator,
) -> bool {
    println!(
        "Fetching prices for {} cryptocurrencies in {}...",
        ids.len(),
        request.currency.to_uppercase()
    );

    // The batched endpoint only carries 24h changes
    let needs_detail = request.windows.iter().any(ChangeWindow::needs_detail);
    let results: Vec<PriceResult> = if needs_detail {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            results.push(
                fetcher
                    .fetch_price_with_change(id, &request.currency, &request.windows)
                    .await,
            );
        }
        results
    } else {
        let include_24h = request.windows.contains(&ChangeWindow::Day);
        let mut by_id = fetcher.fetch_multiple(ids, &request.currency, include_24h).await;
        ids.iter()
            .map(|id| {
                by_id
                    .remove(id)
                    .unwrap_or_else(|| PriceResult::failed(id, &request.currency, "price not found"))
            })
            .collect()
    };

    for result in &results {
        if result.success {
            print_result(result, &request.windows);
        } else {
            println!("Could not retrieve price information for {}.", result.asset_name);
        }
    }

    let narrated = narrator
        .narrate_multiple(&results, &request.windows, request.narrate_intro, &request.options)
        .await;
    info!("Narrated {} of {} requested prices", narrated, ids.len());
    narrated == ids.len()
}

async fn run_history(
    id: &str,
    days: u32,
    request: &RunRequest,
    fetcher: &mut PriceFetcher,
    narrator: &mut Narrator,
) -> bool {
    println!(
        "Fetching {} day history for {} in {}...",
        days,
        display_name(id),
        request.currency.to_uppercase()
    );

    let history = fetcher.fetch_historical(id, &request.currency, days).await;
    let narration = match text::history_narration(&display_name(id), &request.currency, days, &history) {
        Some(narration) if history.success => narration,
        _ => {
            error!("No historical prices for {}", id);
            println!("Could not retrieve price history for {}.", display_name(id));
            return false;
        }
    };

    println!("{} ({} samples)", narration, history.points.len());
    narrator.narrate_text(&narration, &request.options).await
}

fn print_result(result: &PriceResult, windows: &BTreeSet<ChangeWindow>) {
    let Some(price) = result.current_price else {
        return;
    };
    println!(
        "Fetched Price: {} - {} {}",
        result.asset_name,
        text::format_currency(price),
        result.quote_currency
    );
    for window in windows {
        match result.change(*window) {
            Some(change) => println!("  {} change: {:+.2}%", window, change),
            None => println!("  {} change: unavailable", window),
        }
    }
}
