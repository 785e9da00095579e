use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;

use super::error::ApiError;
use super::models::{
    flag, AudioTicket, CryptoNarrationResponse, HealthResponse, NarrateCryptoRequest,
    NarrateTextRequest, PriceParams, PricesParams, PricesResponse,
};
use super::state::AppState;
use crate::data::{windows_from_flags, PriceResult};
use crate::narrator::text;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/crypto/price`: one price, 404 when it could not be fetched
pub async fn get_price(State(state): State<Arc<AppState>>, Query(params): Query<PriceParams>) -> Response {
    let crypto = params.crypto.unwrap_or_else(|| state.defaults.crypto_id.clone());
    let currency = params.currency.unwrap_or_else(|| state.defaults.vs_currency.clone());
    let windows = windows_from_flags(
        flag(&params.with_24h_change),
        flag(&params.with_7d_change),
        flag(&params.with_30d_change),
    );

    let result = {
        let mut fetcher = state.fetcher.lock().await;
        if windows.is_empty() {
            fetcher.fetch_price(&crypto, &currency).await
        } else {
            fetcher.fetch_price_with_change(&crypto, &currency, &windows).await
        }
    };

    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(result)).into_response()
}

/// `GET /api/crypto/prices`: several prices in one upstream request
pub async fn get_prices(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PricesParams>,
) -> Result<Json<PricesResponse>, ApiError> {
    let ids: Vec<String> = params
        .cryptos
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(|id| id.trim().to_lowercase())
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return Err(ApiError::BadRequest("No cryptocurrencies specified".into()));
    }

    let currency = params.currency.unwrap_or_else(|| state.defaults.vs_currency.clone());
    let prices = state
        .fetcher
        .lock()
        .await
        .fetch_multiple(&ids, &currency, flag(&params.with_24h_change))
        .await;

    Ok(Json(PricesResponse {
        success: prices.values().any(|p| p.success),
        count: prices.len(),
        prices,
    }))
}

/// `POST /api/narrator/text`: speech for arbitrary text
pub async fn narrate_text(
    State(state): State<Arc<AppState>>,
    body: Option<Json<NarrateTextRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = body else {
        return Err(ApiError::BadRequest("No text provided".into()));
    };
    let text = match request.text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => return Err(ApiError::BadRequest("No text provided".into())),
    };

    let lang = request.lang.unwrap_or_else(|| state.defaults.lang.clone());
    let slow = request.slow.unwrap_or(state.defaults.slow);
    let (file_id, path) = synthesize_and_store(&state, &text, &lang, slow).await?;

    if request.return_audio {
        return audio_response(&file_id, &path).await;
    }
    Ok(Json(AudioTicket {
        success: true,
        file_id,
        expires_in_seconds: expires_in_seconds(&state),
    })
    .into_response())
}

/// `GET /api/narrator/audio/:file_id`: previously generated audio
pub async fn get_audio(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Response, ApiError> {
    let path = state
        .audio
        .lock()
        .map_err(|_| ApiError::Internal("audio store unavailable".into()))?
        .lookup(&file_id)?;
    audio_response(&file_id, &path).await
}

/// `POST /api/narrator/crypto`: fetch a price and speak it
pub async fn narrate_crypto(
    State(state): State<Arc<AppState>>,
    body: Option<Json<NarrateCryptoRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = body else {
        return Err(ApiError::BadRequest("No data provided".into()));
    };

    let crypto = request.crypto.unwrap_or_else(|| state.defaults.crypto_id.clone());
    let currency = request.currency.unwrap_or_else(|| state.defaults.vs_currency.clone());
    let windows = windows_from_flags(
        request.with_24h_change,
        request.with_7d_change,
        request.with_30d_change,
    );

    let price_data: PriceResult = {
        let mut fetcher = state.fetcher.lock().await;
        if windows.is_empty() {
            fetcher.fetch_price(&crypto, &currency).await
        } else {
            fetcher.fetch_price_with_change(&crypto, &currency, &windows).await
        }
    };

    let narration_text = match text::price_narration(&price_data, &windows) {
        Some(narration) if price_data.success => narration,
        _ => return Err(ApiError::PriceUnavailable(price_data)),
    };

    let lang = request.lang.unwrap_or_else(|| state.defaults.lang.clone());
    let slow = request.slow.unwrap_or(state.defaults.slow);
    let (file_id, path) = synthesize_and_store(&state, &narration_text, &lang, slow).await?;

    if request.return_audio {
        return audio_response(&file_id, &path).await;
    }
    Ok(Json(CryptoNarrationResponse {
        success: true,
        price_data,
        narration_text,
        file_id,
        expires_in_seconds: expires_in_seconds(&state),
    })
    .into_response())
}

async fn synthesize_and_store(
    state: &AppState,
    text: &str,
    lang: &str,
    slow: bool,
) -> Result<(String, std::path::PathBuf), ApiError> {
    info!("Synthesizing {} chars with {}", text.chars().count(), state.synthesizer.name());
    let audio = state
        .synthesizer
        .synthesize(text, lang, slow)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut store = state
        .audio
        .lock()
        .map_err(|_| ApiError::Internal("audio store unavailable".into()))?;
    let file_id = store.store(&audio)?;
    let path = store.lookup(&file_id)?;
    Ok((file_id, path))
}

async fn audio_response(file_id: &str, path: &FsPath) -> Result<Response, ApiError> {
    let bytes = tokio::fs::read(path).await?;
    let disposition = format!("attachment; filename=\"narration_{}.mp3\"", file_id);
    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

fn expires_in_seconds(state: &AppState) -> u64 {
    state
        .audio
        .lock()
        .map(|store| store.ttl().as_secs())
        .unwrap_or(0)
}
