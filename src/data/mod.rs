//! Core data models for price queries and results
//!
//! This module contains the types passed between the price fetcher, the
//! narrator and the front ends, plus the fetch-layer error taxonomy.

pub mod coingecko;
pub mod price_fetcher;
pub mod retry;
pub mod transport;

pub use price_fetcher::{FetcherSettings, PriceFetcher};
pub use retry::{Backoff, RetryPolicy, RetryingClient};
pub use transport::{HttpResponse, ReqwestTransport, Transport, TransportError};

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Time span over which a percentage price change is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChangeWindow {
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl ChangeWindow {
    pub const ALL: [ChangeWindow; 3] = [ChangeWindow::Day, ChangeWindow::Week, ChangeWindow::Month];

    /// Short label used in cache keys and logs
    pub fn label(&self) -> &'static str {
        match self {
            ChangeWindow::Day => "24h",
            ChangeWindow::Week => "7d",
            ChangeWindow::Month => "30d",
        }
    }

    /// Whether the window needs the detailed coin endpoint
    pub fn needs_detail(&self) -> bool {
        !matches!(self, ChangeWindow::Day)
    }
}

impl fmt::Display for ChangeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Builds a window set from the three per-window request flags
pub fn windows_from_flags(with_24h: bool, with_7d: bool, with_30d: bool) -> BTreeSet<ChangeWindow> {
    [
        (with_24h, ChangeWindow::Day),
        (with_7d, ChangeWindow::Week),
        (with_30d, ChangeWindow::Month),
    ]
    .into_iter()
    .filter_map(|(wanted, window)| wanted.then_some(window))
    .collect()
}

/// A single price request, normalised to lowercase identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuery {
    pub asset_id: String,
    pub quote_currency: String,
    pub change_windows: BTreeSet<ChangeWindow>,
}

impl PriceQuery {
    pub fn new(asset_id: &str, quote_currency: &str) -> Self {
        Self {
            asset_id: asset_id.trim().to_lowercase(),
            quote_currency: quote_currency.trim().to_lowercase(),
            change_windows: BTreeSet::new(),
        }
    }

    pub fn with_windows(mut self, windows: impl IntoIterator<Item = ChangeWindow>) -> Self {
        self.change_windows.extend(windows);
        self
    }

    /// Cache key covering every parameter of the query
    pub fn cache_key(&self) -> String {
        let windows: Vec<&str> = self.change_windows.iter().map(ChangeWindow::label).collect();
        format!(
            "price:{}:{}:{}",
            self.asset_id,
            self.quote_currency,
            windows.join(",")
        )
    }

    pub fn needs_detail(&self) -> bool {
        self.change_windows.iter().any(ChangeWindow::needs_detail)
    }
}

/// Price of one asset, optionally with percentage changes
///
/// `current_price == None` together with `success == false` marks a fetch
/// that failed for good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceResult {
    #[serde(rename = "name")]
    pub asset_name: String,
    pub current_price: Option<f64>,
    #[serde(rename = "currency")]
    pub quote_currency: String,
    #[serde(rename = "price_change_24h", default, skip_serializing_if = "Option::is_none")]
    pub change_24h: Option<f64>,
    #[serde(rename = "price_change_7d", default, skip_serializing_if = "Option::is_none")]
    pub change_7d: Option<f64>,
    #[serde(rename = "price_change_30d", default, skip_serializing_if = "Option::is_none")]
    pub change_30d: Option<f64>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PriceResult {
    /// A successful result carrying only the current price
    pub fn priced(asset_id: &str, quote_currency: &str, price: f64) -> Self {
        Self {
            asset_name: display_name(asset_id),
            current_price: Some(price),
            quote_currency: quote_currency.to_uppercase(),
            change_24h: None,
            change_7d: None,
            change_30d: None,
            success: true,
            error: None,
        }
    }

    /// A failed result for the given asset
    pub fn failed(asset_id: &str, quote_currency: &str, error: impl Into<String>) -> Self {
        Self {
            asset_name: display_name(asset_id),
            current_price: None,
            quote_currency: quote_currency.to_uppercase(),
            change_24h: None,
            change_7d: None,
            change_30d: None,
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn change(&self, window: ChangeWindow) -> Option<f64> {
        match window {
            ChangeWindow::Day => self.change_24h,
            ChangeWindow::Week => self.change_7d,
            ChangeWindow::Month => self.change_30d,
        }
    }

    pub fn set_change(&mut self, window: ChangeWindow, value: Option<f64>) {
        match window {
            ChangeWindow::Day => self.change_24h = value,
            ChangeWindow::Week => self.change_7d = value,
            ChangeWindow::Month => self.change_30d = value,
        }
    }
}

/// One (timestamp, price) sample of a historical series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Historical prices for one asset, ordered by timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPrices {
    pub points: Vec<PricePoint>,
    pub success: bool,
}

impl HistoricalPrices {
    pub fn failed() -> Self {
        Self {
            points: Vec::new(),
            success: false,
        }
    }

    pub fn low(&self) -> Option<f64> {
        self.points.iter().map(|p| p.price).reduce(f64::min)
    }

    pub fn high(&self) -> Option<f64> {
        self.points.iter().map(|p| p.price).reduce(f64::max)
    }

    /// Percentage change from the first to the last sample
    pub fn change_percent(&self) -> Option<f64> {
        let first = self.points.first()?.price;
        let last = self.points.last()?.price;
        (first != 0.0).then(|| (last - first) / first * 100.0)
    }
}

/// Sampling interval of a historical query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryInterval {
    Hourly,
    Daily,
}

impl HistoryInterval {
    /// Hourly for a day or less, daily beyond that
    pub fn for_days(days: u32) -> Self {
        if days <= 1 {
            HistoryInterval::Hourly
        } else {
            HistoryInterval::Daily
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryInterval::Hourly => "hourly",
            HistoryInterval::Daily => "daily",
        }
    }
}

/// Capitalises an asset id for display ("bitcoin" -> "Bitcoin")
pub fn display_name(asset_id: &str) -> String {
    let mut chars = asset_id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Errors that can occur while fetching price data
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Connection failure or timeout; retryable
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx status from the price API
    #[error("Upstream returned HTTP {status}")]
    Upstream { status: u16 },

    /// Response parsed but the requested keys are absent
    #[error("Data not found: {0}")]
    DataNotFound(String),

    /// Response body could not be decoded
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Every allowed attempt failed with a retryable error
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<FetchError> },
}
