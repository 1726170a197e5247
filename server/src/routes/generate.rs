//! Data generation routes.

use axum::{extract::State, routing::post, Json, Router};

use crate::error::Result;
use crate::handlers::{handle_generate, GenerateRequest, GenerateResponse};
use crate::AppState;

/// Create generate routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/generate", post(generate_handler))
}

/// POST /generate - Insert synthetic persons. The body is optional.
async fn generate_handler(
    State(state): State<AppState>,
    request: Option<Json<GenerateRequest>>,
) -> Result<Json<GenerateResponse>> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let response = handle_generate(&state.pool, request).await?;
    Ok(Json(response))
}
