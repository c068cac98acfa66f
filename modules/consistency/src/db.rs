//! Connection pool for the accounting database

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::PoolSettings;

/// Pool options for `settings`; the worker count plus the remediation pass
/// should fit inside `max_connections`.
pub fn pool_options(settings: &PoolSettings) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
}

pub async fn init_pool(database_url: &str, settings: &PoolSettings) -> Result<PgPool, sqlx::Error> {
    tracing::info!(
        max_connections = settings.max_connections,
        min_connections = settings.min_connections,
        acquire_timeout_secs = settings.acquire_timeout.as_secs(),
        "Opening database pool"
    );

    pool_options(settings).connect(database_url).await
}
