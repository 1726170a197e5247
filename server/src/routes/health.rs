//! Health check endpoint.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::elastic::ClusterInfo;
use crate::AppState;

/// Health check response.
#[derive(Serialize)]
#[serde(untagged)]
pub enum HealthResponse {
    Ok {
        status: &'static str,
        version: &'static str,
        elasticsearch: ClusterInfo,
    },
    Error {
        status: &'static str,
        error: String,
    },
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

/// Health check handler; healthy when the index answers.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.engine.index().info().await {
        Ok(info) => (
            StatusCode::OK,
            Json(HealthResponse::Ok {
                status: "ok",
                version: env!("CARGO_PKG_VERSION"),
                elasticsearch: info,
            }),
        ),
        Err(e) => {
            tracing::warn!("health check failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HealthResponse::Error {
                    status: "error",
                    error: e.to_string(),
                }),
            )
        }
    }
}

/// Root handler.
async fn root() -> &'static str {
    "Geolab Sync Server"
}
