//! Database connection pool management

use anyhow::{Context, Result};
use backoff::ExponentialBackoff;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Settings;

fn pool_options(settings: &Settings) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
}

fn connect_options(settings: &Settings) -> Result<PgConnectOptions> {
    Ok(PgConnectOptions::from_str(&settings.database_url)
        .context("Invalid DATABASE_URL")?
        .application_name("salesdesk-backend"))
}

/// Create a PostgreSQL connection pool, retrying until the database accepts
/// connections or the configured budget runs out.
pub async fn create_pool(settings: &Settings) -> Result<PgPool> {
    let connect_options = connect_options(settings)?;

    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(500),
        max_interval: Duration::from_secs(5),
        max_elapsed_time: Some(Duration::from_secs(
            settings.database_connect_timeout_seconds,
        )),
        ..Default::default()
    };

    let pool = backoff::future::retry(policy, || {
        let options = pool_options(settings);
        let connect_options = connect_options.clone();
        async move {
            options.connect_with(connect_options).await.map_err(|e| {
                tracing::warn!(error = %e, "Database not ready, retrying");
                backoff::Error::transient(e)
            })
        }
    })
    .await
    .context("Failed to connect to PostgreSQL")?;

    tracing::info!(
        max_connections = settings.database_max_connections,
        "Database connection pool established"
    );

    Ok(pool)
}

/// Pool that connects on first use. Used where a live database is optional.
#[cfg(test)]
pub fn lazy_pool(settings: &Settings) -> Result<PgPool> {
    Ok(pool_options(settings)
        .acquire_timeout(Duration::from_millis(200))
        .min_connections(0)
        .connect_lazy_with(connect_options(settings)?))
}

/// Apply pending schema migrations from `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Lightweight health check for database connectivity
pub async fn health_check(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
}
