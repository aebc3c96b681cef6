//! Postgres connection pool

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

const MAX_CONNECTIONS: u32 = 10;
const CONNECT_ATTEMPTS: usize = 5;

/// Create a connection pool, retrying transient startup failures.
///
/// `acquire_timeout` bounds how long a request waits for a free connection.
pub async fn create_pool(database_url: &str, acquire_timeout: Duration) -> Result<PgPool, sqlx::Error> {
    let strategy = ExponentialBackoff::from_millis(200)
        .map(jitter)
        .take(CONNECT_ATTEMPTS);

    let pool = Retry::start(strategy, move || async move {
        PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Database connection attempt failed");
                e
            })
    })
    .await?;

    tracing::info!(max_connections = MAX_CONNECTIONS, "Database pool created");
    Ok(pool)
}
