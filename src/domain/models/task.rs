//! The `Task` aggregate: the unit of work dispatched to an external agent
//! executor, its status machine, and the small value types hung off it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length, in characters, of [`Task::summary`].
pub const MAX_SUMMARY_LEN: usize = 500;

/// Closed set of task lifecycle states.
///
/// Transitions: `Pending`/`Blocked` -> `Ready` -> `Running` -> (`Completed`
/// | `Failed` | `Cancelled`), with `Running` able to fall back to `Ready`
/// on a retried failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Blocked,
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Blocked => "blocked",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "blocked" => Some(Self::Blocked),
            "ready" => Some(Self::Ready),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// A terminal status never transitions to anything else.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }

    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Blocked, Self::Ready, Self::Cancelled],
            Self::Blocked => &[Self::Ready, Self::Cancelled],
            Self::Ready => &[Self::Running, Self::Cancelled],
            Self::Running => &[Self::Completed, Self::Failed, Self::Ready, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_opt(s).ok_or_else(|| format!("unknown task status: {s}"))
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who or what originated a task. Closed set per `spec.md`, left open for
/// future agent roles via the `Agent` catch-all (mirrors the teacher's
/// `TaskSource::Adapter(String)` escape hatch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskSource {
    Human,
    AgentRequirements,
    AgentPlanner,
    AgentImplementation,
    AgentReview,
    /// Escape hatch for agent roles not named above.
    Agent(String),
}

impl Default for TaskSource {
    fn default() -> Self {
        Self::Human
    }
}

impl TaskSource {
    pub fn as_db_str(&self) -> &str {
        match self {
            Self::Human => "human",
            Self::AgentRequirements => "agent_requirements",
            Self::AgentPlanner => "agent_planner",
            Self::AgentImplementation => "agent_implementation",
            Self::AgentReview => "agent_review",
            Self::Agent(role) => role,
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "human" => Self::Human,
            "agent_requirements" => Self::AgentRequirements,
            "agent_planner" => Self::AgentPlanner,
            "agent_implementation" => Self::AgentImplementation,
            "agent_review" => Self::AgentReview,
            other => Self::Agent(other.to_string()),
        }
    }

    /// Relative weight used by the `PriorityCalculator`'s `source` term.
    /// Highest for a human asking directly, lowest for an implementation
    /// agent spawning its own follow-up work.
    pub fn priority_weight(&self) -> f64 {
        match self {
            Self::Human => 1.0,
            Self::AgentRequirements => 0.75,
            Self::AgentPlanner => 0.6,
            Self::AgentReview => 0.5,
            Self::AgentImplementation => 0.3,
            Self::Agent(_) => 0.4,
        }
    }
}

/// A dependency edge's kind: whether the prerequisite must finish strictly
/// before the dependent can start, or merely alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyType {
    Sequential,
    Parallel,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "sequential" => Some(Self::Sequential),
            "parallel" => Some(Self::Parallel),
            _ => None,
        }
    }
}

/// The unit of work dispatched to an external agent executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub prompt: String,
    pub summary: Option<String>,
    pub agent_type: String,
    /// Base priority in `0..=10`, author-assigned.
    pub priority: u8,
    /// Composite score in `0.0..=100.0` produced by the `PriorityCalculator`.
    pub computed_priority: f64,
    pub status: TaskStatus,
    /// Arbitrary key-value input, opaque to the core, serialized as JSON.
    pub input_data: Option<String>,
    /// Arbitrary key-value output, opaque to the core, serialized as JSON.
    pub result_data: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub max_execution_timeout_seconds: u64,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    /// Hierarchy parent, disjoint from the prerequisite DAG.
    pub parent_task_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub source: TaskSource,
    /// `0` for roots; otherwise `1 + max(depth of prerequisites)`.
    pub dependency_depth: u32,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_duration_seconds: Option<u64>,
    pub feature_branch: Option<String>,
    pub task_branch: Option<String>,
    pub worktree_path: Option<String>,
    /// Optimistic-concurrency counter, bumped on every mutating write.
    pub version: u32,
}

impl Task {
    /// Construct a new task in `Ready` status with no prerequisites.
    /// Callers that enqueue with prerequisites should set `status` to
    /// `Blocked` via [`Task::with_initial_status`] afterwards.
    pub fn new(prompt: impl Into<String>, agent_type: impl Into<String>, created_by: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            summary: None,
            agent_type: agent_type.into(),
            priority: 5,
            computed_priority: 0.0,
            status: TaskStatus::Ready,
            input_data: None,
            result_data: None,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            max_execution_timeout_seconds: 3600,
            submitted_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            created_by: created_by.into(),
            parent_task_id: None,
            session_id: None,
            source: TaskSource::Human,
            dependency_depth: 0,
            deadline: None,
            estimated_duration_seconds: None,
            feature_branch: None,
            task_branch: None,
            worktree_path: None,
            version: 0,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(10);
        self
    }

    pub fn with_source(mut self, source: TaskSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_parent(mut self, parent_task_id: Uuid) -> Self {
        self.parent_task_id = Some(parent_task_id);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.max_execution_timeout_seconds = seconds;
        self
    }

    pub fn with_feature_branch(mut self, feature_branch: impl Into<String>) -> Self {
        self.feature_branch = Some(feature_branch.into());
        self
    }

    pub fn with_task_branch(mut self, task_branch: impl Into<String>) -> Self {
        self.task_branch = Some(task_branch.into());
        self
    }

    pub fn with_worktree_path(mut self, worktree_path: impl Into<String>) -> Self {
        self.worktree_path = Some(worktree_path.into());
        self
    }

    pub fn with_input_data(mut self, input_data: impl Into<String>) -> Self {
        self.input_data = Some(input_data.into());
        self
    }

    /// Used by `Enqueue` to place a freshly constructed task directly into
    /// `Blocked` or `Ready` depending on whether it has prerequisites,
    /// bypassing the usual transition validation (this is initial
    /// placement, not a transition).
    pub fn with_initial_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        self.status.can_transition_to(next)
    }

    /// Attempt a status transition, validating legality and updating
    /// timestamps. Returns the previous status on success.
    pub fn transition_to(&mut self, next: TaskStatus) -> Result<TaskStatus, String> {
        if !self.can_transition_to(next) {
            return Err(format!(
                "invalid transition from {} to {} for task {}",
                self.status, next, self.id
            ));
        }
        let previous = self.status;
        let now = Utc::now();
        match next {
            TaskStatus::Running => self.started_at = Some(now),
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                self.completed_at = Some(now);
            }
            _ => {}
        }
        self.status = next;
        self.updated_at = now;
        self.version += 1;
        Ok(previous)
    }

    /// Bypass transition validation. Reserved for crash-recovery
    /// reconciliation; always logs at the call site.
    pub fn force_status(&mut self, next: TaskStatus) {
        self.status = next;
        self.updated_at = Utc::now();
        self.version += 1;
    }

    /// Validate invariants that must hold before a task is persisted.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(summary) = &self.summary {
            if summary.chars().count() > MAX_SUMMARY_LEN {
                return Err(format!(
                    "summary exceeds {MAX_SUMMARY_LEN} characters ({} given)",
                    summary.chars().count()
                ));
            }
        }
        if self.priority > 10 {
            return Err(format!("priority {} out of range 0..=10", self.priority));
        }
        Ok(())
    }
}

/// Aggregate result handed back by `PruneTasks` / the CLI's `mem prune`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PruneResult {
    pub deleted_count: usize,
    pub deleted_ids: Vec<Uuid>,
    pub blocked_tasks: Vec<BlockedTask>,
    pub dry_run: bool,
    pub bytes_reclaimed: Option<u64>,
}

impl PruneResult {
    pub fn dry_run(blocked_tasks: Vec<BlockedTask>) -> Self {
        Self {
            deleted_count: 0,
            deleted_ids: vec![],
            blocked_tasks,
            dry_run: true,
            bytes_reclaimed: None,
        }
    }

    pub fn actual_deletion(deleted_ids: Vec<Uuid>, blocked_tasks: Vec<BlockedTask>, bytes_reclaimed: Option<u64>) -> Self {
        Self {
            deleted_count: deleted_ids.len(),
            deleted_ids,
            blocked_tasks,
            dry_run: false,
            bytes_reclaimed,
        }
    }

    pub fn is_fully_successful(&self) -> bool {
        self.blocked_tasks.is_empty()
    }
}

/// A task whose deletion was refused by partial-tree preservation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockedTask {
    pub task_id: Uuid,
    pub reason: String,
    pub non_terminal_dependents: Vec<Uuid>,
}

impl BlockedTask {
    pub fn with_dependents(task_id: Uuid, non_terminal_dependents: Vec<Uuid>) -> Self {
        let reason = format!(
            "has {} non-terminal descendant(s)",
            non_terminal_dependents.len()
        );
        Self {
            task_id,
            reason,
            non_terminal_dependents,
        }
    }
}

/// Aggregate counts and summary statistics over the whole queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueStatus {
    pub counts_by_status: HashMap<TaskStatus, i64>,
    pub average_computed_priority: f64,
    pub total: i64,
}

/// Per feature-branch rollup, grounded on the `feature_branch` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureBranchSummary {
    pub branch: String,
    pub total: usize,
    pub by_status: HashMap<TaskStatus, usize>,
    /// Non-terminal tasks on this branch that are preventing progress.
    pub blockers: Vec<Uuid>,
    pub completion_ratio: f64,
    pub mean_priority: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new("do the thing", "implementation", "tester")
    }

    #[test]
    fn new_task_is_ready_with_zero_depth() {
        let t = task();
        assert_eq!(t.status, TaskStatus::Ready);
        assert_eq!(t.dependency_depth, 0);
        assert_eq!(t.version, 0);
    }

    #[test]
    fn ready_to_running_sets_started_at() {
        let mut t = task();
        assert!(t.started_at.is_none());
        t.transition_to(TaskStatus::Running).unwrap();
        assert!(t.started_at.is_some());
        assert_eq!(t.version, 1);
    }

    #[test]
    fn running_to_completed_sets_completed_at() {
        let mut t = task();
        t.transition_to(TaskStatus::Running).unwrap();
        t.transition_to(TaskStatus::Completed).unwrap();
        assert!(t.completed_at.is_some());
        assert!(t.is_terminal());
    }

    #[test]
    fn running_can_fall_back_to_ready_on_retry() {
        let mut t = task();
        t.transition_to(TaskStatus::Running).unwrap();
        t.transition_to(TaskStatus::Ready).unwrap();
        assert_eq!(t.status, TaskStatus::Ready);
    }

    #[test]
    fn terminal_statuses_reject_all_transitions() {
        let mut t = task();
        t.transition_to(TaskStatus::Running).unwrap();
        t.transition_to(TaskStatus::Completed).unwrap();
        for next in [
            TaskStatus::Pending,
            TaskStatus::Blocked,
            TaskStatus::Ready,
            TaskStatus::Running,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert!(t.transition_to(next).is_err());
        }
    }

    #[test]
    fn self_transition_rejected() {
        let mut t = task();
        assert!(t.transition_to(TaskStatus::Ready).is_err());
    }

    #[test]
    fn cancel_from_ready_or_blocked() {
        let mut t = task();
        t.transition_to(TaskStatus::Cancelled).unwrap();
        assert!(t.is_terminal());

        let mut blocked = task();
        blocked.force_status(TaskStatus::Blocked);
        blocked.transition_to(TaskStatus::Cancelled).unwrap();
    }

    #[test]
    fn validate_rejects_overlong_summary() {
        let t = task().with_summary("x".repeat(MAX_SUMMARY_LEN + 1));
        assert!(t.validate().is_err());
    }

    #[test]
    fn validate_accepts_summary_at_limit() {
        let t = task().with_summary("x".repeat(MAX_SUMMARY_LEN));
        assert!(t.validate().is_ok());
    }

    #[test]
    fn force_status_bypasses_validation() {
        let mut t = task();
        t.transition_to(TaskStatus::Running).unwrap();
        t.transition_to(TaskStatus::Completed).unwrap();
        // Without force_status this would be rejected (terminal).
        t.force_status(TaskStatus::Failed);
        assert_eq!(t.status, TaskStatus::Failed);
    }

    #[test]
    fn can_retry_respects_budget() {
        let mut t = task().with_max_retries(2);
        assert!(t.can_retry());
        t.retry_count = 2;
        assert!(!t.can_retry());
    }

    #[test]
    fn source_priority_weight_orders_human_highest() {
        assert!(TaskSource::Human.priority_weight() > TaskSource::AgentPlanner.priority_weight());
        assert!(
            TaskSource::AgentPlanner.priority_weight()
                > TaskSource::AgentImplementation.priority_weight()
        );
    }

    #[test]
    fn source_round_trips_through_db_str() {
        for source in [
            TaskSource::Human,
            TaskSource::AgentRequirements,
            TaskSource::AgentPlanner,
            TaskSource::AgentImplementation,
            TaskSource::AgentReview,
            TaskSource::Agent("agent_custom".to_string()),
        ] {
            let encoded = source.as_db_str().to_string();
            assert_eq!(TaskSource::from_db_str(&encoded), source);
        }
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Blocked,
            TaskStatus::Ready,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            let s = status.as_str();
            assert_eq!(TaskStatus::from_str_opt(s), Some(status));
        }
    }
}
