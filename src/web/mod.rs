//! HTTP front end
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /api/health` | liveness and version |
//! | `GET /api/crypto/price` | one price, optionally with changes |
//! | `GET /api/crypto/prices` | several prices |
//! | `POST /api/narrator/text` | speech for arbitrary text |
//! | `GET /api/narrator/audio/:file_id` | download generated audio |
//! | `POST /api/narrator/crypto` | fetch a price and speak it |

pub mod audio_store;
pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use audio_store::{AudioStore, AUDIO_TTL};
pub use error::ApiError;
pub use state::{AppState, RequestDefaults};

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the API router over shared state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/api/crypto/price", get(handlers::get_price))
        .route("/api/crypto/prices", get(handlers::get_prices))
        .route("/api/narrator/text", post(handlers::narrate_text))
        .route("/api/narrator/audio/:file_id", get(handlers::get_audio))
        .route("/api/narrator/crypto", post(handlers::narrate_crypto))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
