//! Application services: the in-memory `DependencyResolver` and
//! `PriorityCalculator`, and the `TaskQueue`/`SwarmOrchestrator` that
//! compose them with a `Store` and an `AgentExecutor`.

pub mod dependency_resolver;
pub mod priority_calculator;
pub mod swarm_orchestrator;
pub mod task_queue;

pub use dependency_resolver::InMemoryDependencyResolver;
pub use priority_calculator::WeightedPriorityCalculator;
pub use swarm_orchestrator::SwarmOrchestrator;
pub use task_queue::{EnqueueRequest, TaskQueue};
