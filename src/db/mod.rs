//! Database module for SQLite persistence
//!
//! Holds the local copy of students, attendance and performance records plus
//! the outbox of deletions waiting to reach the remote store.

mod local;
mod schema;

pub use local::{LocalStore, SqliteLocalStore, Tombstone};
pub use schema::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::StoreError;

/// Create a new database connection pool
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    initialize_schema(&pool).await?;

    Ok(pool)
}

/// Create a single-connection in-memory pool.
///
/// Every SQLite connection to `:memory:` opens its own database, so the pool
/// is pinned to one connection that never expires.
pub async fn create_memory_pool() -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    initialize_schema(&pool).await?;

    Ok(pool)
}
