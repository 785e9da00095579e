//! Extraction of prices from CoinGecko response bodies
//!
//! Shapes handled:
//!
//! - `/simple/price`: `{"bitcoin": {"usd": 60000.75, "usd_24h_change": -1.2}}`
//! - `/coins/{id}`: `{"market_data": {"price_change_percentage_7d_in_currency": {"usd": 3.4}, ...}}`
//! - `/coins/{id}/market_chart`: `{"prices": [[1711929600000, 70000.1], ...]}`

use std::collections::BTreeMap;

use chrono::DateTime;
use serde_json::Value;

use super::{ChangeWindow, FetchError, PricePoint};

/// Price and 24h change of one asset from a simple-price response
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleQuote {
    pub price: f64,
    pub change_24h: Option<f64>,
}

/// Reads `body[asset][currency]`, failing if either key is absent
pub fn simple_quote(body: &Value, asset_id: &str, currency: &str) -> Result<SimpleQuote, FetchError> {
    let asset = body
        .get(asset_id)
        .ok_or_else(|| FetchError::DataNotFound(format!("'{}' not in response", asset_id)))?;

    let price = asset
        .get(currency)
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            FetchError::DataNotFound(format!("no '{}' price for '{}'", currency, asset_id))
        })?;

    let change_24h = asset
        .get(format!("{}_24h_change", currency))
        .and_then(Value::as_f64);

    Ok(SimpleQuote { price, change_24h })
}

/// Reads every asset present in a batched simple-price response
///
/// Assets missing from the body, or without a price in `currency`, are left
/// out of the map; the caller decides how to report them.
pub fn simple_quotes(
    body: &Value,
    asset_ids: &[String],
    currency: &str,
) -> Result<BTreeMap<String, SimpleQuote>, FetchError> {
    if !body.is_object() {
        return Err(FetchError::MalformedResponse("expected a JSON object".into()));
    }
    Ok(asset_ids
        .iter()
        .filter_map(|id| {
            simple_quote(body, id, currency)
                .ok()
                .map(|quote| (id.clone(), quote))
        })
        .collect())
}

/// Reads the 7d/30d percentage changes from a detailed coin response
///
/// A missing `market_data` block means the coin data does not exist; a
/// missing individual percentage is reported as absent.
pub fn detail_changes(
    body: &Value,
    currency: &str,
    windows: impl IntoIterator<Item = ChangeWindow>,
) -> Result<Vec<(ChangeWindow, Option<f64>)>, FetchError> {
    let market = body
        .get("market_data")
        .filter(|m| m.is_object())
        .ok_or_else(|| FetchError::DataNotFound("no market_data in coin response".into()))?;

    Ok(windows
        .into_iter()
        .filter(ChangeWindow::needs_detail)
        .map(|window| {
            let field = format!("price_change_percentage_{}_in_currency", window.label());
            let value = market
                .get(&field)
                .and_then(|by_currency| by_currency.get(currency))
                .and_then(Value::as_f64);
            (window, value)
        })
        .collect())
}

/// Reads the `prices` series of a market chart response, sorted by time
pub fn market_chart(body: &Value) -> Result<Vec<PricePoint>, FetchError> {
    let prices = body
        .get("prices")
        .ok_or_else(|| FetchError::DataNotFound("no prices in market chart".into()))?
        .as_array()
        .ok_or_else(|| FetchError::MalformedResponse("prices is not an array".into()))?;

    let mut points = prices
        .iter()
        .map(|pair| {
            let millis = pair.get(0).and_then(Value::as_f64);
            let price = pair.get(1).and_then(Value::as_f64);
            match (millis, price) {
                (Some(millis), Some(price)) => DateTime::from_timestamp_millis(millis as i64)
                    .map(|timestamp| PricePoint { timestamp, price })
                    .ok_or_else(|| {
                        FetchError::MalformedResponse(format!("timestamp {} out of range", millis))
                    }),
                _ => Err(FetchError::MalformedResponse(format!(
                    "expected [timestamp, price], got {}",
                    pair
                ))),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    points.sort_by_key(|point| point.timestamp);
    Ok(points)
}
