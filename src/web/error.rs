//! HTTP error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use super::audio_store::AudioLookupError;
use super::models::ErrorResponse;
use crate::data::PriceResult;

/// Errors a handler can answer with; all render `{success: false, error}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// The price could not be fetched; the failed result is included
    #[error("Failed to fetch price data")]
    PriceUnavailable(PriceResult),

    #[error("{0}")]
    Internal(String),
}

impl From<AudioLookupError> for ApiError {
    fn from(err: AudioLookupError) -> Self {
        ApiError::NotFound(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) | ApiError::PriceUnavailable(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
        }

        let message = self.to_string();
        let price_data = match self {
            ApiError::PriceUnavailable(result) => Some(result),
            _ => None,
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            price_data,
        };
        (status, Json(body)).into_response()
    }
}
