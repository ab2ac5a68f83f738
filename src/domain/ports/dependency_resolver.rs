//! The `DependencyResolver` port: graph-theoretic queries over the
//! prerequisite DAG. Grounded on the teacher's
//! `domain::ports::priority_calculator` trait shape (async, `Send + Sync`)
//! and, algorithmically, on the orphaned `services::dependency_resolver`
//! module's DFS/Kahn's-algorithm shapes — adapted to the current `Task`
//! model rather than copied verbatim.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::QueueResult;

#[async_trait]
pub trait DependencyResolver: Send + Sync {
    /// `true` iff adding edges `{(dependent -> p) for p in new_prereqs}`
    /// would create a cycle in the existing graph.
    async fn detect_circular_dependencies(
        &self,
        dependent: Uuid,
        new_prereqs: &[Uuid],
    ) -> QueueResult<bool>;

    /// Longest path, in prerequisite edges, from `task_id` to any root.
    async fn calculate_dependency_depth(&self, task_id: Uuid) -> QueueResult<u32>;

    /// Topological sort (Kahn's algorithm) of the induced subgraph over
    /// `task_ids`; ties broken by computed priority DESC then id.
    async fn get_execution_order(&self, task_ids: &[Uuid]) -> QueueResult<Vec<Uuid>>;

    /// Topological sort batched into levels: each level is a maximal set
    /// of mutually independent tasks.
    async fn get_execution_plan(&self, task_ids: &[Uuid]) -> QueueResult<Vec<Vec<Uuid>>>;

    /// `true` iff every prerequisite of `task_id` is `Completed`.
    async fn are_all_dependencies_met(&self, task_id: Uuid) -> QueueResult<bool>;

    /// Existence check plus cycle check in one call; the gate `TaskQueue`
    /// calls before `Store::insert_dependency`.
    async fn validate_new_dependency(&self, dependent: Uuid, prerequisite: Uuid) -> QueueResult<()>;

    /// Clears the cached adjacency and depth maps; the next query rebuilds
    /// from `Store::list_all_dependency_edges`.
    async fn invalidate_cache(&self);
}
