//! `Checkpoint`: per-task resumable state for the optional iterative loop
//! executor. The loop executor itself is out of scope (`spec.md` §1
//! Non-goals); only the durable row it reads/writes lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The most recent checkpoint per task is authoritative; older iterations
/// for the same task are retained only for audit, never read back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub task_id: Uuid,
    pub iteration: u32,
    /// Opaque serialized state, interpreted by the loop executor.
    pub state: String,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(task_id: Uuid, iteration: u32, state: impl Into<String>) -> Self {
        Self {
            task_id,
            iteration,
            state: state.into(),
            created_at: Utc::now(),
        }
    }
}
