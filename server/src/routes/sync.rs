//! Sync endpoint routes.

use axum::{extract::State, routing::post, Json, Router};

use crate::error::Result;
use crate::handlers::{handle_sync, SyncResponse};
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sync", post(sync_handler))
}

/// POST /sync - Reconcile the index with the database.
async fn sync_handler(State(state): State<AppState>) -> Result<Json<SyncResponse>> {
    let response = handle_sync(&state.engine).await?;
    Ok(Json(response))
}
