//! `SwarmOrchestrator` (`spec.md` §4.5): the single-threaded cooperative
//! poll loop that fans out bounded-concurrency workers. Loosely grounded
//! on the teacher's `services::swarm_orchestrator` shape — `Arc<RwLock<_>>`
//! status, `Arc<Semaphore>` concurrency gate, `tracing` lifecycle events —
//! without its goal/event/federation machinery, which is out of scope
//! here; rebuilt directly from `spec.md`'s pseudocode.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::domain::errors::QueueResult;
use crate::domain::models::Task;
use crate::domain::ports::{AgentExecutor, DependencyResolver, ExecutionResult, PriorityCalculator, Store};
use crate::services::task_queue::TaskQueue;

/// Default worker concurrency (`spec.md` §4.5 "State").
pub const DEFAULT_MAX_CONCURRENT_AGENTS: usize = 10;
/// Default poll interval (`spec.md` §4.5 "State").
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Consecutive empty polls, with no active workers, before the loop gives
/// up and returns (`spec.md` §4.5 main-loop pseudocode).
pub const EMPTY_POLL_BREAK_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorStatus {
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

/// One worker's outcome, paired with the task it ran.
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub task_id: Uuid,
    pub result: ExecutionResult,
}

pub struct SwarmOrchestrator<S, R, P, E> {
    task_queue: Arc<TaskQueue<S, R, P>>,
    executor: Arc<E>,
    max_concurrent_agents: AtomicUsize,
    poll_interval: Duration,
    shutdown_requested: Arc<AtomicBool>,
    status: Arc<RwLock<OrchestratorStatus>>,
}

impl<S, R, P, E> SwarmOrchestrator<S, R, P, E>
where
    S: Store + 'static,
    R: DependencyResolver + 'static,
    P: PriorityCalculator + 'static,
    E: AgentExecutor + 'static,
{
    pub fn new(task_queue: Arc<TaskQueue<S, R, P>>, executor: Arc<E>) -> Self {
        Self {
            task_queue,
            executor,
            max_concurrent_agents: AtomicUsize::new(DEFAULT_MAX_CONCURRENT_AGENTS),
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            status: Arc::new(RwLock::new(OrchestratorStatus::Idle)),
        }
    }

    pub fn with_max_concurrent_agents(self, max_concurrent_agents: usize) -> Self {
        self.max_concurrent_agents.store(max_concurrent_agents.max(1), Ordering::SeqCst);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Rebuilds the concurrency bound for the *next* `start_swarm` call;
    /// in-flight loops are unaffected (`spec.md` §4.5 "Reconfiguration").
    pub fn set_max_concurrent_agents(&self, max_concurrent_agents: usize) {
        self.max_concurrent_agents.store(max_concurrent_agents.max(1), Ordering::SeqCst);
    }

    /// Sets the shutdown flag; in-flight workers run to completion, no new
    /// ones spawn (`spec.md` §4.5 "Shutdown semantics").
    pub fn shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub async fn status(&self) -> OrchestratorStatus {
        *self.status.read().await
    }

    async fn set_status(&self, status: OrchestratorStatus) {
        *self.status.write().await = status;
    }

    /// The main poll loop. Runs until shutdown, `task_limit` tasks have
    /// completed, or `EMPTY_POLL_BREAK_THRESHOLD` consecutive polls found
    /// no `Ready` work with zero active workers (`spec.md` §4.5
    /// `StartSwarm`).
    pub async fn start_swarm(&self, task_limit: Option<usize>) -> QueueResult<Vec<WorkerOutcome>> {
        self.set_status(OrchestratorStatus::Running).await;
        let max_concurrent_agents = self.max_concurrent_agents.load(Ordering::SeqCst);
        tracing::info!(max_concurrent_agents, ?task_limit, "swarm_started");

        let semaphore = Arc::new(Semaphore::new(max_concurrent_agents));
        let (tx, mut rx) = mpsc::unbounded_channel::<WorkerOutcome>();
        let mut join_set: JoinSet<()> = JoinSet::new();
        let mut results = Vec::new();
        let mut empty_polls = 0usize;

        loop {
            if self.shutdown_requested.load(Ordering::SeqCst) {
                tracing::info!("shutdown_requested");
                self.set_status(OrchestratorStatus::ShuttingDown).await;
                break;
            }
            if let Some(limit) = task_limit {
                if results.len() >= limit {
                    break;
                }
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("orchestrator semaphore is never closed");

            match self.task_queue.get_next_task().await? {
                None => {
                    drop(permit);
                    tokio::time::sleep(self.poll_interval).await;
                    drain_completed(&mut rx, &mut results);
                    reap_finished(&mut join_set).await;
                    empty_polls += 1;
                    if join_set.is_empty() && empty_polls >= EMPTY_POLL_BREAK_THRESHOLD {
                        break;
                    }
                }
                Some(task) => {
                    empty_polls = 0;
                    tracing::info!(task_id = %task.id, "worker_spawned");
                    let executor = self.executor.clone();
                    let task_queue = self.task_queue.clone();
                    let tx = tx.clone();
                    join_set.spawn(async move {
                        let _permit = permit;
                        let outcome = run_worker(task_queue, executor, task).await;
                        let _ = tx.send(outcome);
                    });
                    drain_completed(&mut rx, &mut results);
                    reap_finished(&mut join_set).await;
                }
            }
        }

        // Graceful drain: every already-spawned worker runs to completion.
        while join_set.join_next().await.is_some() {}
        drop(tx);
        while let Some(outcome) = rx.recv().await {
            results.push(outcome);
        }

        self.set_status(OrchestratorStatus::Stopped).await;
        tracing::info!(completed = results.len(), "swarm_stopped");
        Ok(results)
    }

    /// Sugar for `start_swarm(task_limit = len(ids))`. Per `spec.md` §4.5:
    /// the orchestrator does not promise those specific ids run, only that
    /// exactly that many tasks complete, chosen by priority.
    pub async fn execute_batch(&self, ids: &[Uuid]) -> QueueResult<Vec<WorkerOutcome>> {
        self.start_swarm(Some(ids.len())).await
    }
}

async fn run_worker<S, R, P, E>(
    task_queue: Arc<TaskQueue<S, R, P>>,
    executor: Arc<E>,
    task: Task,
) -> WorkerOutcome
where
    S: Store,
    R: DependencyResolver,
    P: PriorityCalculator,
    E: AgentExecutor,
{
    let result = executor.execute_task(&task).await;

    if result.success {
        if let Err(e) = task_queue.complete_task(task.id, result.data.clone()).await {
            tracing::error!(task_id = %task.id, error = %e, "failed to persist task completion");
        } else {
            tracing::info!(task_id = %task.id, "task_completed");
        }
    } else {
        let error = result.error.clone().unwrap_or_else(|| "agent executor reported failure".to_string());
        if let Err(e) = task_queue.fail_task(task.id, error).await {
            tracing::error!(task_id = %task.id, error = %e, "failed to persist task failure");
        } else {
            tracing::warn!(task_id = %task.id, "task_failed");
        }
    }

    WorkerOutcome { task_id: task.id, result }
}

fn drain_completed(rx: &mut mpsc::UnboundedReceiver<WorkerOutcome>, results: &mut Vec<WorkerOutcome>) {
    while let Ok(outcome) = rx.try_recv() {
        results.push(outcome);
    }
}

async fn reap_finished(join_set: &mut JoinSet<()>) {
    while join_set.try_join_next().is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteStore};
    use crate::domain::ports::SystemClock;
    use crate::services::dependency_resolver::InMemoryDependencyResolver;
    use crate::services::priority_calculator::WeightedPriorityCalculator;
    use crate::services::task_queue::EnqueueRequest;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    type Resolver = InMemoryDependencyResolver<SqliteStore, SystemClock>;
    type Calculator = WeightedPriorityCalculator<SqliteStore, Resolver, SystemClock>;
    type Queue = TaskQueue<SqliteStore, Resolver, Calculator>;

    struct AlwaysSucceeds {
        calls: StdAtomicUsize,
    }

    #[async_trait]
    impl AgentExecutor for AlwaysSucceeds {
        async fn execute_task(&self, _task: &Task) -> ExecutionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ExecutionResult::success("{}")
        }
    }

    async fn orchestrator(
        executor: Arc<AlwaysSucceeds>,
    ) -> (SwarmOrchestrator<SqliteStore, Resolver, Calculator, AlwaysSucceeds>, Arc<Queue>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let store = Arc::new(SqliteStore::new(pool));
        let clock = Arc::new(SystemClock);
        let resolver = Arc::new(InMemoryDependencyResolver::new(store.clone(), clock.clone()));
        let calculator = Arc::new(WeightedPriorityCalculator::new(store.clone(), resolver.clone(), clock));
        let queue = Arc::new(TaskQueue::new(store, resolver, calculator));
        let orchestrator = SwarmOrchestrator::new(queue.clone(), executor)
            .with_max_concurrent_agents(2)
            .with_poll_interval(Duration::from_millis(5));
        (orchestrator, queue)
    }

    #[tokio::test]
    async fn start_swarm_completes_exactly_task_limit() {
        let executor = Arc::new(AlwaysSucceeds { calls: StdAtomicUsize::new(0) });
        let (orchestrator, queue) = orchestrator(executor).await;

        for i in 0..10 {
            queue
                .enqueue(EnqueueRequest {
                    prompt: format!("task {i}"),
                    agent_type: "implementation".to_string(),
                    created_by: "tester".to_string(),
                    priority: 5,
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let results = orchestrator.start_swarm(Some(5)).await.unwrap();
        assert!(results.len() >= 5);
        assert!(results.len() <= 5 + 2 - 1);
    }

    #[tokio::test]
    async fn start_swarm_returns_empty_when_queue_is_empty() {
        let executor = Arc::new(AlwaysSucceeds { calls: StdAtomicUsize::new(0) });
        let (orchestrator, _queue) = orchestrator(executor).await;

        let results = orchestrator.start_swarm(None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn shutdown_prevents_new_work_from_starting() {
        let executor = Arc::new(AlwaysSucceeds { calls: StdAtomicUsize::new(0) });
        let (orchestrator, queue) = orchestrator(executor).await;
        orchestrator.shutdown();

        queue
            .enqueue(EnqueueRequest {
                prompt: "never runs".to_string(),
                agent_type: "implementation".to_string(),
                created_by: "tester".to_string(),
                priority: 5,
                ..Default::default()
            })
            .await
            .unwrap();

        let results = orchestrator.start_swarm(None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn execute_batch_runs_len_ids_worth_of_tasks() {
        let executor = Arc::new(AlwaysSucceeds { calls: StdAtomicUsize::new(0) });
        let (orchestrator, queue) = orchestrator(executor).await;
        for i in 0..3 {
            queue
                .enqueue(EnqueueRequest {
                    prompt: format!("task {i}"),
                    agent_type: "implementation".to_string(),
                    created_by: "tester".to_string(),
                    priority: 5,
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let fake_ids = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let results = orchestrator.execute_batch(&fake_ids).await.unwrap();
        assert!(results.len() >= 3);
    }
}
