//! `swarm start` (`spec.md` §6 CLI surface / §4.5 `StartSwarm`).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::cli::commands::task::build_queue;
use crate::cli::executor::LoggingAgentExecutor;
use crate::cli::output::{output, CommandOutput};
use crate::infrastructure::Config;
use crate::services::SwarmOrchestrator;

#[derive(Args, Debug)]
pub struct SwarmArgs {
    #[command(subcommand)]
    pub command: SwarmCommands,
}

#[derive(Subcommand, Debug)]
pub enum SwarmCommands {
    /// Run the poll loop until shutdown, the queue drains, or `task_limit`
    /// tasks complete.
    Start {
        #[arg(long)]
        max_agents: Option<usize>,
        #[arg(long)]
        task_limit: Option<usize>,
    },
}

#[derive(Debug, Serialize)]
pub struct SwarmRunOutput {
    pub completed: usize,
    pub failed: usize,
}

impl CommandOutput for SwarmRunOutput {
    fn to_human(&self) -> String {
        format!(
            "swarm stopped: {} task(s) finished ({} failed)",
            self.completed, self.failed
        )
    }
}

pub async fn execute(args: SwarmArgs, pool: SqlitePool, config: &Config, json_mode: bool) -> Result<()> {
    let SwarmCommands::Start { max_agents, task_limit } = args.command;

    let queue = Arc::new(build_queue(pool, config));
    let executor = Arc::new(LoggingAgentExecutor);
    let mut orchestrator = SwarmOrchestrator::new(queue, executor).with_poll_interval(Duration::from_secs_f64(
        config.poll_interval_seconds,
    ));
    if let Some(max_agents) = max_agents {
        orchestrator = orchestrator.with_max_concurrent_agents(max_agents);
    }
    let orchestrator = Arc::new(orchestrator);

    let signal_orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c, requesting swarm shutdown");
            signal_orchestrator.shutdown();
        }
    });

    let results = orchestrator.start_swarm(task_limit).await.context("swarm run failed")?;
    let failed = results.iter().filter(|r| !r.result.success).count();
    output(&SwarmRunOutput { completed: results.len(), failed }, json_mode);

    Ok(())
}
