//! CoinGecko price fetcher
//!
//! Public operations never return errors: every failure is logged and
//! converted into a `success: false` result. Successful results are cached
//! under a key built from the full parameter tuple of the operation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::coingecko::{self, SimpleQuote};
use super::retry::{RetryPolicy, RetryingClient};
use super::transport::{ReqwestTransport, Transport};
use super::{ChangeWindow, FetchError, HistoricalPrices, HistoryInterval, PricePoint, PriceQuery, PriceResult};
use crate::cache::CacheManager;
use crate::config::AppConfig;
use crate::pacing::{Sleeper, TokioSleeper};

/// Payloads stored in the response cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum CachedResponse {
    Price(PriceResult),
    Prices(BTreeMap<String, PriceResult>),
    History(Vec<PricePoint>),
}

/// Everything the fetcher needs from configuration
#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub base_url: String,
    pub price_endpoint: String,
    pub request_timeout: Duration,
    pub min_request_interval: Duration,
    pub retry: RetryPolicy,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub cache_max_items: usize,
    pub cache_file: Option<PathBuf>,
}

impl From<&AppConfig> for FetcherSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            price_endpoint: config.api.price_endpoint.clone(),
            request_timeout: config.api.request_timeout(),
            min_request_interval: config.api.min_request_interval(),
            retry: RetryPolicy::from(&config.retry),
            cache_enabled: config.cache.enabled,
            cache_ttl: config.cache.ttl(),
            cache_max_items: config.cache.max_items,
            cache_file: config.cache.response_cache_file.clone(),
        }
    }
}

/// Fetches current and historical prices with retries and caching
pub struct PriceFetcher {
    client: RetryingClient,
    base_url: String,
    price_endpoint: String,
    cache: Option<CacheManager<CachedResponse>>,
}

impl PriceFetcher {
    /// Creates a fetcher talking to the real API over reqwest
    pub fn new(settings: FetcherSettings) -> Result<Self, reqwest::Error> {
        let transport = ReqwestTransport::new(settings.request_timeout)?;
        Ok(Self::with_transport(settings, Arc::new(transport), Arc::new(TokioSleeper)))
    }

    /// Creates a fetcher with injected transport and sleeper
    pub fn with_transport(
        settings: FetcherSettings,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let cache = settings.cache_enabled.then(|| match &settings.cache_file {
            Some(path) => CacheManager::persistent(path.clone(), settings.cache_ttl, settings.cache_max_items),
            None => CacheManager::new(settings.cache_ttl, settings.cache_max_items),
        });

        Self {
            client: RetryingClient::new(transport, sleeper, settings.retry, settings.min_request_interval),
            base_url: settings.base_url,
            price_endpoint: settings.price_endpoint,
            cache,
        }
    }

    /// Number of entries currently held in the response cache
    pub fn cached_entries(&self) -> usize {
        self.cache.as_ref().map_or(0, CacheManager::len)
    }

    /// Fetches the current price of one asset, without change data
    pub async fn fetch_price(&mut self, asset_id: &str, quote_currency: &str) -> PriceResult {
        let query = PriceQuery::new(asset_id, quote_currency);
        self.fetch_query(&query).await
    }

    /// Fetches the current price plus the requested percentage changes
    ///
    /// 24h change rides along with the simple price call; 7d and 30d need a
    /// second request to the detailed coin endpoint. Both requests share one
    /// retry budget and the combined result is cached as one entry.
    pub async fn fetch_price_with_change(
        &mut self,
        asset_id: &str,
        quote_currency: &str,
        windows: &BTreeSet<ChangeWindow>,
    ) -> PriceResult {
        let query = PriceQuery::new(asset_id, quote_currency).with_windows(windows.iter().copied());
        self.fetch_query(&query).await
    }

    /// Fetches several assets in one batched request
    ///
    /// Every requested id appears in the returned map; ids the API did not
    /// return are marked `success: false`.
    pub async fn fetch_multiple(
        &mut self,
        asset_ids: &[String],
        quote_currency: &str,
        include_24h_change: bool,
    ) -> BTreeMap<String, PriceResult> {
        let ids = dedup_ids(asset_ids);
        let currency = quote_currency.trim().to_lowercase();
        if ids.is_empty() {
            return BTreeMap::new();
        }

        let key = format!("prices:{}:{}:{}", ids.join(","), currency, include_24h_change);
        if let Some(CachedResponse::Prices(results)) = self.cached(&key) {
            return results;
        }

        let url = self.price_url();
        let mut params = vec![
            ("ids".to_string(), ids.join(",")),
            ("vs_currencies".to_string(), currency.clone()),
        ];
        if include_24h_change {
            params.push(("include_24hr_change".to_string(), "true".to_string()));
        }

        let mut backoff = self.client.policy().backoff();
        let outcome = self
            .client
            .get_validated(&url, &params, &mut backoff, |body| {
                coingecko::simple_quotes(body, &ids, &currency)
            })
            .await;

        match outcome {
            Ok(quotes) => {
                let results: BTreeMap<String, PriceResult> = ids
                    .iter()
                    .map(|id| {
                        let result = match quotes.get(id) {
                            Some(quote) => quote_result(id, &currency, quote, include_24h_change),
                            None => PriceResult::failed(id, &currency, "price not found"),
                        };
                        (id.clone(), result)
                    })
                    .collect();
                info!(
                    "Fetched {} of {} prices in {}",
                    quotes.len(),
                    ids.len(),
                    currency.to_uppercase()
                );
                self.store(&key, CachedResponse::Prices(results.clone()));
                results
            }
            Err(e) => {
                error!("Failed to fetch prices for {}: {}", ids.join(","), e);
                ids.iter()
                    .map(|id| (id.clone(), PriceResult::failed(id, &currency, e.to_string())))
                    .collect()
            }
        }
    }

    /// Fetches a historical price series
    ///
    /// Hourly samples for `days <= 1`, daily samples otherwise.
    pub async fn fetch_historical(&mut self, asset_id: &str, quote_currency: &str, days: u32) -> HistoricalPrices {
        let asset_id = asset_id.trim().to_lowercase();
        let currency = quote_currency.trim().to_lowercase();
        let interval = HistoryInterval::for_days(days);

        let key = format!("history:{}:{}:{}:{}", asset_id, currency, days, interval.as_str());
        if let Some(CachedResponse::History(points)) = self.cached(&key) {
            return HistoricalPrices { points, success: true };
        }

        let url = format!("{}/coins/{}/market_chart", self.base_url, asset_id);
        let params = vec![
            ("vs_currency".to_string(), currency.clone()),
            ("days".to_string(), days.to_string()),
            ("interval".to_string(), interval.as_str().to_string()),
        ];

        let mut backoff = self.client.policy().backoff();
        match self
            .client
            .get_validated(&url, &params, &mut backoff, coingecko::market_chart)
            .await
        {
            Ok(points) => {
                info!("Fetched {} historical points for {}", points.len(), asset_id);
                self.store(&key, CachedResponse::History(points.clone()));
                HistoricalPrices { points, success: true }
            }
            Err(e) => {
                error!("Failed to fetch {} day history for {}: {}", days, asset_id, e);
                HistoricalPrices::failed()
            }
        }
    }

    async fn fetch_query(&mut self, query: &PriceQuery) -> PriceResult {
        let key = query.cache_key();
        if let Some(CachedResponse::Price(result)) = self.cached(&key) {
            return result;
        }

        match self.request_query(query).await {
            Ok(result) => {
                info!(
                    "Fetched {} price: {:?} {}",
                    result.asset_name, result.current_price, result.quote_currency
                );
                self.store(&key, CachedResponse::Price(result.clone()));
                result
            }
            Err(e) => {
                error!(
                    "Failed to fetch price for '{}' in '{}': {}",
                    query.asset_id, query.quote_currency, e
                );
                PriceResult::failed(&query.asset_id, &query.quote_currency, e.to_string())
            }
        }
    }

    /// Performs the one or two requests a query needs under one backoff
    async fn request_query(&mut self, query: &PriceQuery) -> Result<PriceResult, FetchError> {
        let with_24h = query.change_windows.contains(&ChangeWindow::Day);
        let url = self.price_url();
        let mut params = vec![
            ("ids".to_string(), query.asset_id.clone()),
            ("vs_currencies".to_string(), query.quote_currency.clone()),
        ];
        if with_24h {
            params.push(("include_24hr_change".to_string(), "true".to_string()));
        }

        let mut backoff = self.client.policy().backoff();
        let quote = self
            .client
            .get_validated(&url, &params, &mut backoff, |body| {
                coingecko::simple_quote(body, &query.asset_id, &query.quote_currency)
            })
            .await?;

        let mut result = quote_result(&query.asset_id, &query.quote_currency, &quote, with_24h);

        if query.needs_detail() {
            let detail_url = format!("{}/coins/{}", self.base_url, query.asset_id);
            let detail_params = [
                ("localization", "false"),
                ("tickers", "false"),
                ("market_data", "true"),
                ("community_data", "false"),
                ("developer_data", "false"),
                ("sparkline", "false"),
            ]
            .map(|(k, v)| (k.to_string(), v.to_string()));

            let windows = query.change_windows.iter().copied().collect::<Vec<_>>();
            let changes = self
                .client
                .get_validated(&detail_url, &detail_params, &mut backoff, |body| {
                    coingecko::detail_changes(body, &query.quote_currency, windows.iter().copied())
                })
                .await?;

            for (window, value) in changes {
                if value.is_none() {
                    debug!("No {} change reported for {}", window, query.asset_id);
                }
                result.set_change(window, value);
            }
        }

        Ok(result)
    }

    fn price_url(&self) -> String {
        format!("{}{}", self.base_url, self.price_endpoint)
    }

    fn cached(&mut self, key: &str) -> Option<CachedResponse> {
        let hit = self.cache.as_mut()?.get(key);
        if hit.is_some() {
            debug!("Response cache hit for '{}'", key);
        }
        hit
    }

    fn store(&mut self, key: &str, response: CachedResponse) {
        if let Some(cache) = self.cache.as_mut() {
            cache.insert(key, response);
        }
    }
}

fn quote_result(asset_id: &str, currency: &str, quote: &SimpleQuote, with_24h: bool) -> PriceResult {
    let mut result = PriceResult::priced(asset_id, currency, quote.price);
    if with_24h {
        result.change_24h = quote.change_24h;
    }
    result
}

/// Lowercases ids and drops blanks and repeats, keeping first-seen order
fn dedup_ids(asset_ids: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    asset_ids
        .iter()
        .map(|id| id.trim().to_lowercase())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}
