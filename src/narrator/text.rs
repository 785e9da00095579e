//! Narration sentence building
//!
//! Amounts are spoken with a thousands separator and two decimals; changes
//! are spoken as a direction ("up" for zero or more, "down" otherwise) and an
//! absolute percentage with two decimals.

use std::collections::BTreeSet;

use crate::data::{ChangeWindow, HistoricalPrices, PriceResult};

/// Formats an amount as `1,234,567.89`
pub fn format_currency(amount: f64) -> String {
    if !amount.is_finite() {
        return amount.to_string();
    }

    let fixed = format!("{:.2}", amount.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    // -0.001 rounds to "0.00" and should not be spoken as negative
    let sign = if amount < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0') {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, grouped, fraction)
}

/// Direction word for a percentage change
pub fn direction(change: f64) -> &'static str {
    if change >= 0.0 {
        "up"
    } else {
        "down"
    }
}

/// "The current price for Bitcoin is 60,000.75 USD."
pub fn price_sentence(asset_name: &str, price: f64, currency: &str) -> String {
    format!(
        "The current price for {} is {} {}.",
        asset_name,
        format_currency(price),
        currency.to_uppercase()
    )
}

/// Sentence describing one window's change
pub fn change_sentence(window: ChangeWindow, change: f64) -> String {
    let dir = direction(change);
    let magnitude = change.abs();
    match window {
        ChangeWindow::Day => format!(
            "It has gone {} {:.2} percent in the last 24 hours.",
            dir, magnitude
        ),
        ChangeWindow::Week => format!(
            "Over the past 7 days, it has gone {} {:.2} percent.",
            dir, magnitude
        ),
        ChangeWindow::Month => format!(
            "In the last 30 days, it has gone {} {:.2} percent.",
            dir, magnitude
        ),
    }
}

/// Full narration for a price result, including the requested windows that
/// have a value. `None` when the result carries no price.
pub fn price_narration(result: &PriceResult, windows: &BTreeSet<ChangeWindow>) -> Option<String> {
    let price = result.current_price?;
    let mut text = price_sentence(&result.asset_name, price, &result.quote_currency);
    for window in windows {
        if let Some(change) = result.change(*window) {
            text.push(' ');
            text.push_str(&change_sentence(*window, change));
        }
    }
    Some(text)
}

/// Opening sentence of a multi-asset narration
pub fn intro_sentence(count: usize) -> String {
    if count == 1 {
        "Here is the current price for 1 cryptocurrency.".to_string()
    } else {
        format!("Here are the current prices for {} cryptocurrencies.", count)
    }
}

/// Closing sentence of a multi-asset narration
pub fn closing_sentence(narrated: usize) -> String {
    format!(
        "That concludes the price update for {} cryptocurrencies.",
        narrated
    )
}

/// Summary of a historical range: low, high and first-to-last change
pub fn history_narration(
    asset_name: &str,
    currency: &str,
    days: u32,
    history: &HistoricalPrices,
) -> Option<String> {
    let low = history.low()?;
    let high = history.high()?;
    let currency = currency.to_uppercase();
    let span = if days == 1 {
        "24 hours".to_string()
    } else {
        format!("{} days", days)
    };

    let mut text = format!(
        "Over the last {}, {} traded between {} and {} {}.",
        span,
        asset_name,
        format_currency(low),
        format_currency(high),
        currency
    );
    if let Some(change) = history.change_percent() {
        text.push_str(&format!(
            " Overall it has gone {} {:.2} percent.",
            direction(change),
            change.abs()
        ));
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PricePoint;
    use chrono::DateTime;

    #[test]
    fn test_format_currency_groups_thousands() {
        assert_eq!(format_currency(60000.75), "60,000.75");
        assert_eq!(format_currency(1234567.891), "1,234,567.89");
        assert_eq!(format_currency(999.999), "1,000.00");
        assert_eq!(format_currency(100.0), "100.00");
        assert_eq!(format_currency(0.5), "0.50");
        assert_eq!(format_currency(-2500.0), "-2,500.00");
        assert_eq!(format_currency(-0.001), "0.00");
    }

    #[test]
    fn test_price_sentence() {
        assert_eq!(
            price_sentence("Bitcoin", 60000.75, "usd"),
            "The current price for Bitcoin is 60,000.75 USD."
        );
    }

    #[test]
    fn test_change_sentences_use_direction_and_magnitude() {
        assert_eq!(
            change_sentence(ChangeWindow::Day, -3.456),
            "It has gone down 3.46 percent in the last 24 hours."
        );
        assert_eq!(
            change_sentence(ChangeWindow::Week, 0.0),
            "Over the past 7 days, it has gone up 0.00 percent."
        );
        assert_eq!(
            change_sentence(ChangeWindow::Month, 12.5),
            "In the last 30 days, it has gone up 12.50 percent."
        );
    }

    #[test]
    fn test_price_narration_includes_only_requested_present_windows() {
        let mut result = PriceResult::priced("ethereum", "eur", 3000.0);
        result.change_24h = Some(1.0);
        result.change_7d = Some(-2.0);
        let windows = [ChangeWindow::Day, ChangeWindow::Month].into_iter().collect();

        let text = price_narration(&result, &windows).expect("Has price");

        assert_eq!(
            text,
            "The current price for Ethereum is 3,000.00 EUR. It has gone up 1.00 percent in the last 24 hours."
        );
    }

    #[test]
    fn test_price_narration_without_price() {
        let result = PriceResult::failed("bitcoin", "usd", "boom");
        assert!(price_narration(&result, &BTreeSet::new()).is_none());
    }

    #[test]
    fn test_intro_and_closing() {
        assert_eq!(
            intro_sentence(2),
            "Here are the current prices for 2 cryptocurrencies."
        );
        assert_eq!(
            intro_sentence(1),
            "Here is the current price for 1 cryptocurrency."
        );
        assert!(closing_sentence(3).contains("3 cryptocurrencies"));
    }

    #[test]
    fn test_history_narration() {
        let at = |secs| DateTime::from_timestamp(secs, 0).expect("valid timestamp");
        let history = HistoricalPrices {
            points: vec![
                PricePoint { timestamp: at(0), price: 100.0 },
                PricePoint { timestamp: at(86_400), price: 90.0 },
            ],
            success: true,
        };

        let text = history_narration("Bitcoin", "usd", 7, &history).expect("Has points");

        assert_eq!(
            text,
            "Over the last 7 days, Bitcoin traded between 90.00 and 100.00 USD. Overall it has gone down 10.00 percent."
        );
        assert!(history_narration("Bitcoin", "usd", 7, &HistoricalPrices::failed()).is_none());
    }
}
