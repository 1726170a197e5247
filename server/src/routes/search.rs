//! Search endpoint routes.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use crate::error::Result;
use crate::handlers::{handle_search, SearchParams, SearchResponse};
use crate::AppState;

/// Create search routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/search", get(search_handler))
}

/// GET /search - Text or proximity search.
async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    let response = handle_search(&state.engine, params).await?;
    Ok(Json(response))
}
