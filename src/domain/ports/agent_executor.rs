//! `AgentExecutor`: the external collaborator the `SwarmOrchestrator`
//! dispatches work to. Its wire protocol, retry policy, and OAuth refresh
//! are explicitly out of scope (`spec.md` §1); this crate only needs the
//! seam described in `spec.md` §6 "Consumed external interfaces".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::models::Task;

/// Outcome of one `AgentExecutor::execute_task` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub data: Option<String>,
    pub error: Option<String>,
    pub metadata: Option<String>,
}

impl ExecutionResult {
    pub fn success(data: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            error: None,
            metadata: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: None,
        }
    }
}

/// Black-box LLM/agent runner. Implementations may take seconds to
/// minutes and may fail transiently; the orchestrator treats every
/// outcome (success or failure) as final for that attempt and leaves
/// retry policy to `TaskQueue::fail_task`.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute_task(&self, task: &Task) -> ExecutionResult;
}
