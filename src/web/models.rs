//! Request and response bodies of the HTTP API

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::PriceResult;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Query of `GET /api/crypto/price`
///
/// Flags are the strings "true"/"false" (any case); anything else is false.
#[derive(Debug, Default, Deserialize)]
pub struct PriceParams {
    pub crypto: Option<String>,
    pub currency: Option<String>,
    pub with_24h_change: Option<String>,
    pub with_7d_change: Option<String>,
    pub with_30d_change: Option<String>,
}

/// Query of `GET /api/crypto/prices`
#[derive(Debug, Default, Deserialize)]
pub struct PricesParams {
    pub cryptos: Option<String>,
    pub currency: Option<String>,
    pub with_24h_change: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PricesResponse {
    pub prices: BTreeMap<String, PriceResult>,
    pub success: bool,
    pub count: usize,
}

/// Body of `POST /api/narrator/text`
#[derive(Debug, Default, Deserialize)]
pub struct NarrateTextRequest {
    pub text: Option<String>,
    pub lang: Option<String>,
    pub slow: Option<bool>,
    #[serde(default)]
    pub return_audio: bool,
}

/// Body of `POST /api/narrator/crypto`
#[derive(Debug, Default, Deserialize)]
pub struct NarrateCryptoRequest {
    pub crypto: Option<String>,
    pub currency: Option<String>,
    #[serde(default)]
    pub with_24h_change: bool,
    #[serde(default)]
    pub with_7d_change: bool,
    #[serde(default)]
    pub with_30d_change: bool,
    pub lang: Option<String>,
    pub slow: Option<bool>,
    #[serde(default)]
    pub return_audio: bool,
}

/// Reference to stored audio, returned instead of the audio itself
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioTicket {
    pub success: bool,
    pub file_id: String,
    pub expires_in_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CryptoNarrationResponse {
    pub success: bool,
    pub price_data: PriceResult,
    pub narration_text: String,
    pub file_id: String,
    pub expires_in_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_data: Option<PriceResult>,
}

/// Reads a "true"/"false" query flag
pub fn flag(value: &Option<String>) -> bool {
    value
        .as_deref()
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_parsing() {
        assert!(flag(&Some("true".to_string())));
        assert!(flag(&Some("TRUE".to_string())));
        assert!(!flag(&Some("yes".to_string())));
        assert!(!flag(&Some("false".to_string())));
        assert!(!flag(&None));
    }

    #[test]
    fn test_narrate_crypto_request_defaults() {
        let request: NarrateCryptoRequest = serde_json::from_str(r#"{"crypto":"ethereum"}"#).unwrap();
        assert_eq!(request.crypto.as_deref(), Some("ethereum"));
        assert!(!request.with_24h_change);
        assert!(!request.return_audio);
        assert!(request.slow.is_none());
    }
}
