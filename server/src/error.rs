//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] geolab_engine::Error),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    fn parts(&self) -> (StatusCode, String) {
        use geolab_engine::Error as EngineError;

        match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Engine(e @ EngineError::Connectivity { .. }) => {
                tracing::error!("Engine error: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            AppError::Engine(e @ EngineError::CycleInProgress) => {
                tracing::warn!("Engine error: {}", e);
                (StatusCode::CONFLICT, e.to_string())
            }
            AppError::Engine(e @ EngineError::InvalidQuery(_)) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.parts();

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
