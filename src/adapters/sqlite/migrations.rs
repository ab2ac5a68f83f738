//! Embedded, versioned, idempotent schema migrations. Grounded on the
//! teacher's `adapters::sqlite::migrations` module: a `schema_migrations`
//! bookkeeping table, `include_str!`-embedded SQL files, and a monotonic
//! version gate so re-running is always a no-op (`spec.md` §8 "Idempotence").

use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration {version} failed: {source}")]
    ExecutionError {
        version: i64,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to check current schema version: {0}")]
    VersionCheckError(#[source] sqlx::Error),
}

pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

pub fn all_embedded_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "initial schema: tasks, task_dependencies, checkpoints",
        sql: include_str!("../../../migrations/001_initial_schema.sql"),
    }]
}

pub struct Migrator<'a> {
    pool: &'a SqlitePool,
}

impl<'a> Migrator<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Applies every migration with `version > current_version`, in
    /// ascending order, inside its own statement. Each migration's SQL is
    /// written to check for its own precondition (e.g. `CREATE TABLE IF
    /// NOT EXISTS`, `CREATE INDEX IF NOT EXISTS`) so re-running the full
    /// set is always a no-op.
    pub async fn run_embedded_migrations(&self, migrations: Vec<Migration>) -> Result<usize, MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                description TEXT NOT NULL
            )",
        )
        .execute(self.pool)
        .await
        .map_err(MigrationError::VersionCheckError)?;

        let current_version: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(self.pool)
            .await
            .map_err(MigrationError::VersionCheckError)?;

        let mut applied = 0usize;
        for migration in migrations.into_iter().filter(|m| m.version > current_version) {
            sqlx::raw_sql(migration.sql)
                .execute(self.pool)
                .await
                .map_err(|source| MigrationError::ExecutionError {
                    version: migration.version,
                    source,
                })?;

            sqlx::query("INSERT OR IGNORE INTO schema_migrations (version, description) VALUES (?, ?)")
                .bind(migration.version)
                .bind(migration.description)
                .execute(self.pool)
                .await
                .map_err(|source| MigrationError::ExecutionError {
                    version: migration.version,
                    source,
                })?;

            applied += 1;
        }
        Ok(applied)
    }
}
