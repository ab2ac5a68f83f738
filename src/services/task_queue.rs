//! `TaskQueue`: the application-level contract surface of `spec.md` §4.4 —
//! enqueue/dequeue/complete/fail/cancel transitions plus the read-only
//! status/summary/plan queries. Grounded on the teacher's `TaskService`
//! (`services::task_service`) for the overall shape — one service owning
//! a `Store` + `DependencyResolver` + `PriorityCalculator` and composing
//! them per operation — generalized to the five-term priority model and
//! the richer `Enqueue` parameter set this spec names.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::{QueueError, QueueResult};
use crate::domain::models::{
    FeatureBranchSummary, QueueStatus, Task, TaskDependency, TaskSource, TaskStatus,
};
use crate::domain::ports::{DependencyResolver, PriorityCalculator, Store, TaskFilter};

/// Parameters for [`TaskQueue::enqueue`]. Most fields mirror `spec.md`
/// §4.4's `Enqueue` parameter list directly; grouped into a struct because
/// the list is long and almost everything past `prompt` is optional.
#[derive(Debug, Clone, Default)]
pub struct EnqueueRequest {
    pub prompt: String,
    pub summary: Option<String>,
    pub source: TaskSource,
    pub agent_type: String,
    pub priority: u8,
    pub prerequisites: Vec<Uuid>,
    pub deadline: Option<DateTime<Utc>>,
    pub feature_branch: Option<String>,
    pub task_branch: Option<String>,
    pub worktree_path: Option<String>,
    pub parent_task_id: Option<Uuid>,
    pub created_by: String,
    pub session_id: Option<String>,
    pub input_data: Option<String>,
    pub max_retries: Option<u32>,
    pub max_execution_timeout_seconds: Option<u64>,
}

pub struct TaskQueue<S, R, P> {
    store: Arc<S>,
    resolver: Arc<R>,
    calculator: Arc<P>,
}

impl<S, R, P> TaskQueue<S, R, P>
where
    S: Store,
    R: DependencyResolver,
    P: PriorityCalculator,
{
    pub fn new(store: Arc<S>, resolver: Arc<R>, calculator: Arc<P>) -> Self {
        Self { store, resolver, calculator }
    }

    /// Validates the summary, runs the cycle precheck, inserts the task in
    /// `Blocked` or `Ready` depending on prerequisite completion, inserts
    /// dependency rows, computes the initial priority, and invalidates the
    /// resolver cache (`spec.md` §4.4 `Enqueue`).
    pub async fn enqueue(&self, req: EnqueueRequest) -> QueueResult<Uuid> {
        if !req.prerequisites.is_empty() {
            let dependent_placeholder = Uuid::new_v4();
            if self
                .resolver
                .detect_circular_dependencies(dependent_placeholder, &req.prerequisites)
                .await?
            {
                return Err(QueueError::Cycle {
                    dependent: dependent_placeholder,
                    prerequisite: req.prerequisites[0],
                    path: req.prerequisites.clone(),
                });
            }
        }

        let mut prereq_tasks = Vec::with_capacity(req.prerequisites.len());
        for &prereq_id in &req.prerequisites {
            let prereq = self
                .store
                .get_task(prereq_id)
                .await?
                .ok_or_else(|| QueueError::not_found("task", prereq_id))?;
            prereq_tasks.push(prereq);
        }

        let max_prereq_depth = prereq_tasks.iter().map(|t| t.dependency_depth).max();
        let dependency_depth = max_prereq_depth.map(|d| d + 1).unwrap_or(0);
        let all_prereqs_completed = prereq_tasks.iter().all(|t| t.status == TaskStatus::Completed);
        let initial_status = if !prereq_tasks.is_empty() && !all_prereqs_completed {
            TaskStatus::Blocked
        } else {
            TaskStatus::Ready
        };

        let mut task = Task::new(req.prompt, req.agent_type, req.created_by)
            .with_priority(req.priority)
            .with_source(req.source)
            .with_initial_status(initial_status);
        task.dependency_depth = dependency_depth;
        if let Some(summary) = req.summary {
            task = task.with_summary(summary);
        }
        if let Some(deadline) = req.deadline {
            task = task.with_deadline(deadline);
        }
        if let Some(branch) = req.feature_branch {
            task = task.with_feature_branch(branch);
        }
        if let Some(branch) = req.task_branch {
            task = task.with_task_branch(branch);
        }
        if let Some(path) = req.worktree_path {
            task = task.with_worktree_path(path);
        }
        if let Some(parent) = req.parent_task_id {
            task = task.with_parent(parent);
        }
        if let Some(session) = req.session_id {
            task = task.with_session(session);
        }
        if let Some(input) = req.input_data {
            task = task.with_input_data(input);
        }
        if let Some(max_retries) = req.max_retries {
            task = task.with_max_retries(max_retries);
        }
        if let Some(timeout) = req.max_execution_timeout_seconds {
            task = task.with_timeout(timeout);
        }

        task.validate().map_err(QueueError::Validation)?;
        task.computed_priority = self.calculator.calculate_priority(&task).await?;

        self.store.insert_task(&task).await?;
        for &prereq_id in &req.prerequisites {
            self.store
                .insert_dependency(&TaskDependency::sequential(task.id, prereq_id))
                .await?;
        }
        self.resolver.invalidate_cache().await;

        Ok(task.id)
    }

    /// Highest-`computed_priority` `Ready` task, atomically claimed.
    pub async fn get_next_task(&self) -> QueueResult<Option<Task>> {
        self.store.claim_next_ready_task().await
    }

    /// Transitions `id` to `Completed`, then cascades: every dependent that
    /// had `id` as a prerequisite is re-checked, and any now fully
    /// satisfied is promoted `Blocked -> Ready` with its priority
    /// recomputed (`spec.md` §4.4 `CompleteTask`).
    pub async fn complete_task(&self, id: Uuid, result_data: Option<String>) -> QueueResult<Task> {
        let completed = self
            .store
            .update_task_status(id, TaskStatus::Completed, None, result_data)
            .await?;
        self.resolver.invalidate_cache().await;

        let dependents = self.store.get_dependents(id).await?;
        for edge in dependents {
            let dependent_id = edge.dependent_task_id;
            let Some(dependent) = self.store.get_task(dependent_id).await? else {
                continue;
            };
            if dependent.status != TaskStatus::Blocked {
                continue;
            }
            if self.resolver.are_all_dependencies_met(dependent_id).await? {
                let promoted = self
                    .store
                    .update_task_status(dependent_id, TaskStatus::Ready, None, None)
                    .await?;
                let priority = self.calculator.calculate_priority(&promoted).await?;
                self.store
                    .update_task_priority(dependent_id, priority, promoted.dependency_depth)
                    .await?;
            }
        }

        Ok(completed)
    }

    /// Increments the retry counter; returns the task to `Ready` if under
    /// budget, else terminally `Failed` (`spec.md` §4.4 `FailTask`).
    pub async fn fail_task(&self, id: Uuid, error: String) -> QueueResult<Task> {
        self.store.record_task_failure(id, error).await
    }

    /// `Ready`/`Blocked` -> `Cancelled`. `Running` tasks are also
    /// transitioned (the state machine permits it); the worker executing
    /// them observes the new status cooperatively at its next suspension
    /// point rather than being interrupted (`spec.md` §4.4 `CancelTask`).
    pub async fn cancel_task(&self, id: Uuid) -> QueueResult<Task> {
        let cancelled = self
            .store
            .update_task_status(id, TaskStatus::Cancelled, None, None)
            .await?;
        self.resolver.invalidate_cache().await;
        Ok(cancelled)
    }

    pub async fn get_queue_status(&self) -> QueueResult<QueueStatus> {
        let counts_by_status = self.store.get_status_counts().await?;
        let total = counts_by_status.values().sum();
        let average_computed_priority = self.store.average_computed_priority().await?;
        Ok(QueueStatus {
            counts_by_status,
            average_computed_priority,
            total,
        })
    }

    /// Per-branch histogram, completion ratio, mean priority, and the set
    /// of non-terminal tasks currently blocking downstream progress
    /// (`spec.md` §3 "QueueStatus (derived)"; shape per `SPEC_FULL.md`'s
    /// feature-branch-summary supplement).
    pub async fn get_feature_branch_summary(&self, branch: &str) -> QueueResult<FeatureBranchSummary> {
        let filter = TaskFilter {
            feature_branch: Some(branch.to_string()),
            ..Default::default()
        };
        let tasks = self.store.list_tasks(&filter, 100_000).await?;

        let mut by_status: HashMap<TaskStatus, usize> = HashMap::new();
        let mut blockers = Vec::new();
        let mut priority_sum = 0.0;

        for task in &tasks {
            *by_status.entry(task.status).or_insert(0) += 1;
            priority_sum += task.computed_priority;
            if !task.status.is_terminal() && self.store.count_blocked_downstream(task.id).await? > 0 {
                blockers.push(task.id);
            }
        }

        let total = tasks.len();
        let completed = by_status.get(&TaskStatus::Completed).copied().unwrap_or(0);
        let completion_ratio = if total == 0 { 0.0 } else { completed as f64 / total as f64 };
        let mean_priority = if total == 0 { 0.0 } else { priority_sum / total as f64 };

        Ok(FeatureBranchSummary {
            branch: branch.to_string(),
            total,
            by_status,
            blockers,
            completion_ratio,
            mean_priority,
        })
    }

    /// Ordered phases over `ids`: each a maximal set of mutually
    /// independent tasks (`spec.md` §4.4 `GetTaskExecutionPlan`).
    pub async fn get_task_execution_plan(&self, ids: &[Uuid]) -> QueueResult<Vec<Vec<Uuid>>> {
        self.resolver.get_execution_plan(ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteStore};
    use crate::domain::ports::SystemClock;
    use crate::services::dependency_resolver::InMemoryDependencyResolver;
    use crate::services::priority_calculator::WeightedPriorityCalculator;

    type Resolver = InMemoryDependencyResolver<SqliteStore, SystemClock>;
    type Calculator = WeightedPriorityCalculator<SqliteStore, Resolver, SystemClock>;
    type Queue = TaskQueue<SqliteStore, Resolver, Calculator>;

    async fn queue() -> (Queue, Arc<SqliteStore>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let store = Arc::new(SqliteStore::new(pool));
        let clock = Arc::new(SystemClock);
        let resolver = Arc::new(InMemoryDependencyResolver::new(store.clone(), clock.clone()));
        let calculator = Arc::new(WeightedPriorityCalculator::new(store.clone(), resolver.clone(), clock));
        (TaskQueue::new(store.clone(), resolver, calculator), store)
    }

    fn basic_request(prompt: &str) -> EnqueueRequest {
        EnqueueRequest {
            prompt: prompt.to_string(),
            agent_type: "implementation".to_string(),
            created_by: "tester".to_string(),
            priority: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn enqueue_without_prerequisites_is_ready() {
        let (queue, store) = queue().await;
        let id = queue.enqueue(basic_request("do the thing")).await.unwrap();
        let task = store.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Ready);
        assert_eq!(task.dependency_depth, 0);
    }

    #[tokio::test]
    async fn enqueue_with_incomplete_prerequisite_is_blocked() {
        let (queue, store) = queue().await;
        let a_id = queue.enqueue(basic_request("a")).await.unwrap();

        let mut req = basic_request("b");
        req.prerequisites = vec![a_id];
        let b_id = queue.enqueue(req).await.unwrap();

        let b = store.get_task(b_id).await.unwrap().unwrap();
        assert_eq!(b.status, TaskStatus::Blocked);
        assert_eq!(b.dependency_depth, 1);
    }

    #[tokio::test]
    async fn enqueue_rejects_missing_prerequisite() {
        let (queue, _store) = queue().await;
        let mut req = basic_request("b");
        req.prerequisites = vec![Uuid::new_v4()];
        let err = queue.enqueue(req).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound { .. }));
    }

    #[tokio::test]
    async fn complete_task_promotes_blocked_dependent_to_ready() {
        let (queue, store) = queue().await;
        let a_id = queue.enqueue(basic_request("a")).await.unwrap();
        let mut req = basic_request("b");
        req.prerequisites = vec![a_id];
        let b_id = queue.enqueue(req).await.unwrap();

        queue.complete_task(a_id, Some("{}".to_string())).await.unwrap();

        let b = store.get_task(b_id).await.unwrap().unwrap();
        assert_eq!(b.status, TaskStatus::Ready);
    }

    #[tokio::test]
    async fn complete_task_leaves_multiply_blocked_dependent_blocked() {
        let (queue, store) = queue().await;
        let a_id = queue.enqueue(basic_request("a")).await.unwrap();
        let c_id = queue.enqueue(basic_request("c")).await.unwrap();
        let mut req = basic_request("b");
        req.prerequisites = vec![a_id, c_id];
        let b_id = queue.enqueue(req).await.unwrap();

        queue.complete_task(a_id, None).await.unwrap();

        let b = store.get_task(b_id).await.unwrap().unwrap();
        assert_eq!(b.status, TaskStatus::Blocked);
    }

    #[tokio::test]
    async fn fail_task_retries_then_fails_terminally() {
        let (queue, store) = queue().await;
        let mut req = basic_request("flaky");
        req.max_retries = Some(1);
        let id = queue.enqueue(req).await.unwrap();

        queue.get_next_task().await.unwrap();
        let after_first = queue.fail_task(id, "boom".to_string()).await.unwrap();
        assert_eq!(after_first.status, TaskStatus::Failed);

        let final_task = store.get_task(id).await.unwrap().unwrap();
        assert_eq!(final_task.retry_count, 1);
    }

    #[tokio::test]
    async fn cancel_task_from_ready() {
        let (queue, _store) = queue().await;
        let id = queue.enqueue(basic_request("cancel me")).await.unwrap();
        let cancelled = queue.cancel_task(id).await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn queue_status_counts_all_tasks() {
        let (queue, _store) = queue().await;
        queue.enqueue(basic_request("a")).await.unwrap();
        queue.enqueue(basic_request("b")).await.unwrap();

        let status = queue.get_queue_status().await.unwrap();
        assert_eq!(status.total, 2);
    }

    #[tokio::test]
    async fn feature_branch_summary_computes_ratio() {
        let (queue, _store) = queue().await;
        let mut req_a = basic_request("a");
        req_a.feature_branch = Some("feat/x".to_string());
        let a_id = queue.enqueue(req_a).await.unwrap();

        let mut req_b = basic_request("b");
        req_b.feature_branch = Some("feat/x".to_string());
        queue.enqueue(req_b).await.unwrap();

        queue.complete_task(a_id, None).await.unwrap();

        let summary = queue.get_feature_branch_summary("feat/x").await.unwrap();
        assert_eq!(summary.total, 2);
        assert!((summary.completion_ratio - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn execution_plan_batches_independent_branches() {
        let (queue, _store) = queue().await;
        let a_id = queue.enqueue(basic_request("a")).await.unwrap();
        let mut req_b = basic_request("b");
        req_b.prerequisites = vec![a_id];
        let b_id = queue.enqueue(req_b).await.unwrap();
        let mut req_c = basic_request("c");
        req_c.prerequisites = vec![a_id];
        let c_id = queue.enqueue(req_c).await.unwrap();

        let plan = queue.get_task_execution_plan(&[a_id, b_id, c_id]).await.unwrap();
        assert_eq!(plan[0], vec![a_id]);
        assert_eq!(plan[1].len(), 2);
    }
}
