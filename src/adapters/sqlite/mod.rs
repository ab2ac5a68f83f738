//! SQLite adapter: connection management, embedded migrations, and the
//! `Store` implementation. Grounded on the teacher's
//! `adapters::sqlite` module, including its shared row-parsing helpers.

pub mod connection;
pub mod migrations;
pub mod store;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

pub use store::SqliteStore;

use crate::domain::errors::QueueError;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Connection(#[from] connection::ConnectionError),
    #[error(transparent)]
    Migration(#[from] migrations::MigrationError),
    #[error(transparent)]
    Query(#[from] sqlx::Error),
}

/// Opens (creating if missing) the database at `database_url` and brings
/// its schema up to date.
pub async fn initialize_database(database_url: &str) -> Result<SqlitePool, DatabaseError> {
    let pool = connection::create_pool(database_url, None).await?;
    migrations::Migrator::new(&pool)
        .run_embedded_migrations(migrations::all_embedded_migrations())
        .await?;
    Ok(pool)
}

/// Test helper: an in-memory database, migrated, ready to use.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = connection::create_test_pool().await?;
    migrations::Migrator::new(&pool)
        .run_embedded_migrations(migrations::all_embedded_migrations())
        .await?;
    Ok(pool)
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, QueueError> {
    Uuid::parse_str(s).map_err(|e| QueueError::FatalStore(format!("corrupt uuid column {s:?}: {e}")))
}

pub(crate) fn parse_optional_uuid(s: Option<&str>) -> Result<Option<Uuid>, QueueError> {
    s.map(parse_uuid).transpose()
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, QueueError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QueueError::FatalStore(format!("corrupt timestamp column {s:?}: {e}")))
}

pub(crate) fn parse_optional_datetime(s: Option<&str>) -> Result<Option<DateTime<Utc>>, QueueError> {
    s.map(parse_datetime).transpose()
}
