//! Thin clap-derive CLI over the five component contracts (`spec.md` §6
//! "Exposed programmatic interface"). Grounded on the teacher's
//! `cli` module shape (`Cli`/`Commands`, one file per subcommand group,
//! `CommandOutput` for human/JSON dual rendering) — trimmed to the
//! representative surface `spec.md` §6 names: `swarm start`, `task
//! enqueue/list/get/cancel`, `mem prune`.

pub mod commands;
mod executor;
mod output;

use clap::{Parser, Subcommand};

pub use commands::{mem::MemArgs, swarm::SwarmArgs, task::TaskArgs};
pub use executor::LoggingAgentExecutor;
pub use output::{output, truncate, CommandOutput};

#[derive(Parser, Debug)]
#[command(name = "abathur-queue", version, about = "Persistent, dependency-aware task queue and swarm orchestration engine")]
pub struct Cli {
    /// Emit machine-readable JSON instead of a human summary.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the swarm orchestrator.
    Swarm(SwarmArgs),
    /// Enqueue, list, inspect, or cancel tasks.
    Task(TaskArgs),
    /// Prune terminal tasks from the store.
    Mem(MemArgs),
}
