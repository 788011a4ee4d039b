//! Health check endpoints.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Which upstream operations have credentials.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Services {
    pub spotify: bool,
    pub lastfm: bool,
    pub summary: bool,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    pub services: Services,
}

/// Simple health check. Never touches an upstream.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services: Services {
            spotify: state.spotify.is_some(),
            lastfm: state.lastfm.is_some(),
            summary: state.llm.is_some(),
        },
    })
}

/// Create health check routes.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
