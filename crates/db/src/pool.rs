//! Postgres connection pool for the approval-flow schema.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::DbError;

/// Type alias for the shared Postgres pool handed to `PgStore` and the
/// repository functions.
pub type DbPool = PgPool;

/// Create a new connection pool from the given `database_url`.
///
/// `max_connections` controls the pool ceiling; the API server and the
/// `migrate` subcommand pick different ceilings.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, DbError> {
    info!("Connecting to approval-flow database (max_connections={max_connections})");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Apply the embedded approval-flow migrations (templates, instances,
/// records, instance-number sequence) from the workspace-root
/// `migrations/` directory.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("Applying approval-flow schema migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}
