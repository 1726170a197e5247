//! Database connection pool management.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Type alias for the database pool.
pub type Pool = PgPool;

/// Create a new database connection pool.
///
/// Connecting is attempted up to `retries` times. The wait between attempts
/// starts at `delay` and doubles after every failure.
pub async fn create_pool(
    database_url: &str,
    retries: u32,
    delay: Duration,
) -> Result<Pool, sqlx::Error> {
    let mut delay = delay;
    let mut attempt = 1;

    loop {
        match PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                tracing::info!("Connected to PostgreSQL");
                return Ok(pool);
            }
            Err(e) if attempt < retries => {
                tracing::warn!(
                    "PostgreSQL connection failed (attempt {}/{}): {}",
                    attempt,
                    retries,
                    e
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run database migrations.
pub async fn run_migrations(pool: &Pool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
