//! Geolab Server - keeps an Elasticsearch index of persons in sync with
//! PostgreSQL and serves text and proximity search over it.

mod config;
mod db;
mod elastic;
mod error;
mod handlers;
mod routes;
mod watermark;

use crate::config::Config;
use crate::db::{PgEntitySource, Pool};
use crate::elastic::ElasticIndex;
use crate::watermark::FileWatermarkStore;
use axum::Router;
use geolab_engine::{clock::epoch, SyncEngine, SystemClock, WatermarkStore};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The sync engine wired to the production stores.
pub type Engine = SyncEngine<PgEntitySource, ElasticIndex, FileWatermarkStore, SystemClock>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub engine: Arc<Engine>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "geolab_server=debug,geolab_engine=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Geolab Server on {}:{}", config.host, config.port);

    // Create database pool
    let pool = db::create_pool(
        &config.database_url,
        config.db_connect_retries,
        config.db_connect_delay,
    )
    .await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    // Prepare the index; a fresh one holds nothing, so the next sync starts over
    let index = ElasticIndex::new(
        &config.elasticsearch_url,
        &config.index_name,
        config.bulk_chunk_size,
    )?;
    let watermark = FileWatermarkStore::new(&config.watermark_path);
    tracing::info!("Watermark file: {}", watermark.path().display());
    if index.ensure_index(config.recreate_index).await? {
        watermark.write(epoch()).await?;
        tracing::info!("Index {} created, watermark reset", index.index_name());
    }

    // Build application state
    let engine = SyncEngine::new(
        PgEntitySource::new(pool.clone()),
        index,
        watermark,
        SystemClock,
        config.watermark_policy,
    )
    .with_commit_lag(config.commit_lag);
    let state = AppState {
        pool,
        engine: Arc::new(engine),
    };

    // Build router
    let app = Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
