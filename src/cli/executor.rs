use async_trait::async_trait;

use crate::domain::models::Task;
use crate::domain::ports::{AgentExecutor, ExecutionResult};

/// Stand-in `AgentExecutor` for the CLI binary. The real LLM/agent wire
/// protocol (`spec.md` §1 Non-goals) is out of scope for this crate; this
/// implementation exists only so `swarm start` has something to run
/// against, and logs the prompt it would have sent rather than reaching
/// any network.
pub struct LoggingAgentExecutor;

#[async_trait]
impl AgentExecutor for LoggingAgentExecutor {
    async fn execute_task(&self, task: &Task) -> ExecutionResult {
        tracing::warn!(
            task_id = %task.id,
            agent_type = %task.agent_type,
            "no real AgentExecutor configured; reporting task_execution failure"
        );
        ExecutionResult::failure("no AgentExecutor backend configured for this build")
    }
}
