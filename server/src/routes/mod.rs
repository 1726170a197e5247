//! HTTP route definitions.

mod generate;
mod health;
mod search;
mod sync;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(sync::routes())
        .merge(search::routes())
        .merge(generate::routes())
}
