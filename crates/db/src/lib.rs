//! Persistence for sweep generations.
//!
//! - [`models`]: row structs and DTOs.
//! - [`repositories`]: zero-sized `sqlx` repositories over [`DbPool`].
//! - [`store`]: the [`GenerationStore`] trait the pipeline and poller
//!   depend on, plus its PostgreSQL implementation.
//! - [`memory`]: an in-process [`GenerationStore`] for single-process
//!   deployments and tests.

use sqlx::postgres::PgPoolOptions;

pub mod memory;
pub mod models;
pub mod repositories;
pub mod store;

pub use memory::InMemoryGenerationStore;
pub use store::{GenerationStore, PgGenerationStore, StoreError};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Run a trivial query to verify the pool can reach the database.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
