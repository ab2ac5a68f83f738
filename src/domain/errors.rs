//! The unified error taxonomy (`spec.md` §7). Grounded on the teacher's
//! `domain::errors::DomainError` (the single enum actually wired into its
//! services) for shape, and on `domain::error::TaskError`/`DatabaseError`
//! for the `is_transient`/`is_permanent` classification idiom.

use uuid::Uuid;

/// The eight error kinds of `spec.md` §7, carrying enough context to act
/// on without a second lookup.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("dependency {prerequisite} would close a cycle back to {dependent} via path {path:?}")]
    Cycle {
        dependent: Uuid,
        prerequisite: Uuid,
        path: Vec<Uuid>,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("transient store error: {0}")]
    TransientStore(#[source] sqlx::Error),

    #[error("fatal store error: {0}")]
    FatalStore(String),

    #[error("task execution failed: {0}")]
    TaskExecution(String),

    #[error("task {task_id} exceeded its {timeout_seconds}s execution timeout")]
    Timeout { task_id: Uuid, timeout_seconds: u64 },

    #[error("task {0} was cancelled")]
    Cancelled(Uuid),
}

/// Convenience alias used throughout the crate instead of `anyhow::Result`,
/// so callers can match on `QueueError`'s kind.
pub type QueueResult<T> = Result<T, QueueError>;

impl QueueError {
    /// Errors SQLite itself considers retryable (`SQLITE_BUSY`/`SQLITE_LOCKED`)
    /// surface as `TransientStore`; everything else the Store produces is
    /// either a clean validation/not-found error or fatal.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }

    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Cycle { .. } | Self::NotFound { .. } | Self::FatalStore(_)
        )
    }

    pub fn duplicate_key(id: Uuid) -> Self {
        Self::Validation(format!("task {id} already exists"))
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if is_busy_or_locked(db_err.message()) => {
                Self::TransientStore(err)
            }
            sqlx::Error::PoolTimedOut => Self::TransientStore(err),
            _ => Self::FatalStore(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("serialization error: {err}"))
    }
}

fn is_busy_or_locked(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("busy") || lower.contains("locked")
}
