//! MemberGate shared infrastructure
//!
//! Database pool construction and embedded migrations used by the API server.

use std::time::Duration;

use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Embedded SQL migrations (`crates/shared/migrations`)
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Default pool size when the caller does not override it
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Create the main database pool for regular queries
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "Database pool created");
    Ok(pool)
}

/// Apply pending migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    tracing::info!("Running database migrations...");
    MIGRATOR.run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
