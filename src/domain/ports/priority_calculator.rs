//! The `PriorityCalculator` port. Grounded on the teacher's
//! `domain::ports::priority_calculator::PriorityCalculator` trait (the
//! single-task/batch split), re-specified against the current `Task`
//! shape and `spec.md` §4.3's five-term weighted formula instead of the
//! orphaned implementation's three-term additive one.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::QueueResult;
use crate::domain::models::Task;

#[async_trait]
pub trait PriorityCalculator: Send + Sync {
    /// Computes the composite score in `0.0..=100.0` for a single task,
    /// consulting the `Store`/`DependencyResolver` for depth and
    /// downstream-blocking counts as needed.
    async fn calculate_priority(&self, task: &Task) -> QueueResult<f64>;

    /// Batched recomputation over a candidate set, for callers that would
    /// otherwise call `calculate_priority` in a loop (e.g. `CompleteTask`'s
    /// cascade over all dependents of the completed task).
    async fn recalculate_priorities(&self, tasks: &[Task]) -> QueueResult<Vec<(Uuid, f64)>>;
}
