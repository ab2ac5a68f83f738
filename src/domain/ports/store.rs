//! The `Store` port: durable task/dependency/checkpoint persistence.
//! Grounded on the teacher's `domain::ports::task_repository::TaskRepository`
//! trait shape, extended with the tree/prune/checkpoint operations
//! `spec.md` §4.1 requires and the teacher's repository does not (yet)
//! expose on a single trait.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::QueueResult;
use crate::domain::models::{
    Checkpoint, PruneResult, Task, TaskDependency, TaskSource, TaskStatus,
};

/// Composable filters for `Store::list_tasks`. `status` and `exclude_status`
/// may both be set; they AND (`spec.md` §4.1).
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub exclude_status: Option<TaskStatus>,
    pub source: Option<TaskSource>,
    pub agent_type: Option<String>,
    pub feature_branch: Option<String>,
}

/// One row of a `GetTaskTreeWithStatus` result: the hierarchy (not the
/// dependency DAG) rooted at one or more tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTreeRow {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub status: TaskStatus,
    pub depth: u32,
}

/// VACUUM policy for `PruneTasks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VacuumMode {
    Never,
    #[default]
    Conditional,
    Always,
}

/// Filters and options for `Store::prune_tasks`.
#[derive(Debug, Clone)]
pub struct PruneFilters {
    /// Statuses eligible for deletion (must be terminal).
    pub allowed_statuses: Vec<TaskStatus>,
    pub feature_branch: Option<String>,
    /// When true, computes each match's full subtree and only deletes it
    /// whole, never a fragment (`spec.md` §4.1 "partial-tree preservation").
    pub recursive: bool,
    pub vacuum: VacuumMode,
    pub dry_run: bool,
}

/// Durable persistence for tasks, dependency edges, and loop-executor
/// checkpoints. A single-writer SQLite database in the reference
/// implementation; any implementation must give the same transactional
/// guarantees (`spec.md` §4.1 "Failure semantics").
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_task(&self, task: &Task) -> QueueResult<()>;

    async fn get_task(&self, id: Uuid) -> QueueResult<Option<Task>>;

    /// Ordered by `computed_priority DESC, submitted_at ASC`.
    async fn list_tasks(&self, filters: &TaskFilter, limit: i64) -> QueueResult<Vec<Task>>;

    /// Atomically verifies the transition is legal and sets timestamps.
    async fn update_task_status(
        &self,
        id: Uuid,
        new_status: TaskStatus,
        error_message: Option<String>,
        result_data: Option<String>,
    ) -> QueueResult<Task>;

    /// Persist `task.computed_priority` and `task.dependency_depth` without
    /// otherwise touching status/timestamps.
    async fn update_task_priority(&self, id: Uuid, computed_priority: f64, dependency_depth: u32) -> QueueResult<()>;

    /// Atomically claims the single highest-`computed_priority` `Ready`
    /// task and transitions it to `Running`, or returns `None` if no
    /// `Ready` task exists. The compare-and-swap is a single UPDATE guarded
    /// by `WHERE status = 'ready'` so concurrent callers never double-claim.
    async fn claim_next_ready_task(&self) -> QueueResult<Option<Task>>;

    /// Atomically increments `retry_count` and transitions the task:
    /// `Ready` (with `started_at` cleared) if the incremented count is
    /// still under `max_retries`, else `Failed`. Only legal from `Running`.
    async fn record_task_failure(&self, id: Uuid, error_message: String) -> QueueResult<Task>;

    /// `SELECT AVG(computed_priority)`, `0.0` over an empty table.
    async fn average_computed_priority(&self) -> QueueResult<f64>;

    /// Raw insert with no cycle check; the caller (`TaskQueue`) is
    /// responsible for calling `DependencyResolver::validate_new_dependency`
    /// first, matching the teacher's split between `task_service` (where
    /// the cycle check happens) and the repository (a plain insert).
    async fn insert_dependency(&self, dep: &TaskDependency) -> QueueResult<()>;

    async fn get_dependencies(&self, task_id: Uuid) -> QueueResult<Vec<TaskDependency>>;

    async fn get_dependents(&self, task_id: Uuid) -> QueueResult<Vec<TaskDependency>>;

    /// All dependency edges in the database; used by the resolver to
    /// rebuild its cached adjacency structure from scratch.
    async fn list_all_dependency_edges(&self) -> QueueResult<Vec<TaskDependency>>;

    /// Number of non-terminal tasks that have `task_id` as a direct
    /// prerequisite: the `PriorityCalculator`'s `blocking` term input.
    async fn count_blocked_downstream(&self, task_id: Uuid) -> QueueResult<u64>;

    /// `WITH RECURSIVE` traversal of the `parent_task_id` hierarchy,
    /// bounded by `max_depth` if given and filtered to `filter_statuses`
    /// if given. Ordered by `depth ASC, id ASC`.
    async fn get_task_tree_with_status(
        &self,
        root_ids: &[Uuid],
        max_depth: Option<u32>,
        filter_statuses: Option<&[TaskStatus]>,
    ) -> QueueResult<Vec<TaskTreeRow>>;

    async fn prune_tasks(&self, filters: &PruneFilters) -> QueueResult<PruneResult>;

    async fn get_status_counts(&self) -> QueueResult<HashMap<TaskStatus, i64>>;

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> QueueResult<()>;

    async fn get_latest_checkpoint(&self, task_id: Uuid) -> QueueResult<Option<Checkpoint>>;

    /// Test-only helper: runs `EXPLAIN QUERY PLAN` for the given SQL and
    /// returns the plan rows as strings, used to assert index usage.
    async fn explain_query_plan(&self, sql: &str) -> QueueResult<Vec<String>>;
}

/// Used by the `PriorityCalculator`'s `urgency` term; kept as a free
/// function so callers without a `DateTime<Utc>` on hand (tests with a
/// fixed clock) can call it directly. Injected clock per `spec.md` §9
/// design note "inject a clock source for deterministic tests".
pub fn hours_until(now: DateTime<Utc>, deadline: DateTime<Utc>) -> f64 {
    (deadline - now).num_seconds() as f64 / 3600.0
}
