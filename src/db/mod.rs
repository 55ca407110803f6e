use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;

// ============================================================================
// Persistence - Postgres pool, migrations and per-table repositories
// ============================================================================

pub mod users;
pub mod sessions;
pub mod customers;
pub mod publishers;
pub mod books;
pub mod carts;
pub mod orders;

pub async fn connect(config: &Config) -> Result<PgPool> {
    tracing::info!("Connecting to Postgres...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("✅ Database connected and migrated");
    Ok(pool)
}

/// Turn a stored text value that no longer parses into a decode error.
pub(crate) fn decode_err(e: String) -> sqlx::Error {
    sqlx::Error::Decode(e.into())
}
