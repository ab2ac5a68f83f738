//! `mem prune` (`spec.md` §6 CLI surface / §4.1 `PruneTasks`). `--namespace`
//! maps onto the `feature_branch` filter, the closest in-scope analogue to
//! the external memory/document index's namespace concept.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::adapters::sqlite::SqliteStore;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::TaskStatus;
use crate::domain::ports::{PruneFilters, Store, VacuumMode};

#[derive(Args, Debug)]
pub struct MemArgs {
    #[command(subcommand)]
    pub command: MemCommands,
}

#[derive(Subcommand, Debug)]
pub enum MemCommands {
    /// Delete terminal tasks, optionally scoped to one feature branch.
    Prune {
        #[arg(long)]
        namespace: Option<String>,
        /// Refuse to delete a subtree containing any non-terminal task.
        #[arg(long)]
        recursive: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Serialize)]
pub struct PruneOutput {
    pub dry_run: bool,
    pub deleted_count: usize,
    pub blocked_count: usize,
    pub bytes_reclaimed: Option<u64>,
}

impl CommandOutput for PruneOutput {
    fn to_human(&self) -> String {
        if self.dry_run {
            format!(
                "dry run: would delete {} task(s); {} subtree(s) blocked by non-terminal descendants",
                self.deleted_count, self.blocked_count
            )
        } else {
            let reclaimed = self
                .bytes_reclaimed
                .map(|b| format!(", {b} bytes reclaimed"))
                .unwrap_or_default();
            format!(
                "deleted {} task(s){reclaimed}; {} subtree(s) left intact (non-terminal descendants)",
                self.deleted_count, self.blocked_count
            )
        }
    }
}

pub async fn execute(args: MemArgs, pool: SqlitePool, json_mode: bool) -> Result<()> {
    let MemCommands::Prune { namespace, recursive, dry_run, force } = args.command;

    if recursive && !dry_run && !force {
        anyhow::bail!("recursive prune without --dry-run requires --force");
    }

    let store = SqliteStore::new(pool);
    let filters = PruneFilters {
        allowed_statuses: vec![TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled],
        feature_branch: namespace,
        recursive,
        vacuum: VacuumMode::Conditional,
        dry_run,
    };

    let result = store.prune_tasks(&filters).await.context("prune failed")?;
    output(
        &PruneOutput {
            dry_run: result.dry_run,
            deleted_count: result.deleted_count,
            blocked_count: result.blocked_tasks.len(),
            bytes_reclaimed: result.bytes_reclaimed,
        },
        json_mode,
    );

    Ok(())
}
