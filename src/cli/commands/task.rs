//! `task enqueue|list|get|cancel` (`spec.md` §6 CLI surface).

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::SqliteStore;
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{Task, TaskSource, TaskStatus};
use crate::domain::ports::{Store, SystemClock, TaskFilter};
use crate::infrastructure::Config;
use crate::services::dependency_resolver::InMemoryDependencyResolver;
use crate::services::priority_calculator::WeightedPriorityCalculator;
use crate::services::task_queue::{EnqueueRequest, TaskQueue};

type Resolver = InMemoryDependencyResolver<SqliteStore, SystemClock>;
type Calculator = WeightedPriorityCalculator<SqliteStore, Resolver, SystemClock>;
type Queue = TaskQueue<SqliteStore, Resolver, Calculator>;

pub(crate) fn build_queue(pool: SqlitePool, config: &Config) -> Queue {
    let store = Arc::new(SqliteStore::new(pool));
    let clock = Arc::new(SystemClock);
    let resolver = Arc::new(InMemoryDependencyResolver::with_ttl(
        store.clone(),
        clock.clone(),
        std::time::Duration::from_secs(config.cache_ttl_seconds),
    ));
    let calculator = Arc::new(WeightedPriorityCalculator::new(store.clone(), resolver.clone(), clock));
    TaskQueue::new(store, resolver, calculator)
}

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Enqueue a new task.
    Enqueue {
        /// The prompt to send to the agent.
        prompt: String,
        #[arg(long)]
        summary: Option<String>,
        #[arg(long, default_value = "implementation")]
        agent_type: String,
        #[arg(long, default_value_t = 5)]
        priority: u8,
        /// Prerequisite task ids; must all already exist.
        #[arg(long = "prereq")]
        prerequisites: Vec<Uuid>,
        #[arg(long)]
        feature_branch: Option<String>,
        #[arg(long)]
        deadline: Option<DateTime<Utc>>,
        #[arg(long, default_value = "cli")]
        created_by: String,
    },
    /// List tasks, newest priority first.
    List {
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        exclude_status: Option<TaskStatus>,
        #[arg(long)]
        agent_type: Option<String>,
        #[arg(long)]
        feature_branch: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show one task in full.
    Get { id: Uuid },
    /// Cancel a task (`Ready`/`Blocked`/`Running` -> `Cancelled`).
    Cancel { id: Uuid },
}

#[derive(Debug, Serialize)]
pub struct TaskSummary {
    pub id: Uuid,
    pub prompt: String,
    pub status: String,
    pub priority: u8,
    pub computed_priority: f64,
    pub agent_type: String,
    pub retry_count: u32,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            prompt: task.prompt.clone(),
            status: task.status.as_str().to_string(),
            priority: task.priority,
            computed_priority: task.computed_priority,
            agent_type: task.agent_type.clone(),
            retry_count: task.retry_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskListOutput {
    pub total: usize,
    pub tasks: Vec<TaskSummary>,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return "No tasks found.".to_string();
        }
        let mut lines = vec![format!(
            "{:<36} {:<30} {:<10} {:>8}",
            "ID", "PROMPT", "STATUS", "PRIORITY"
        )];
        for task in &self.tasks {
            lines.push(format!(
                "{:<36} {:<30} {:<10} {:>8.2}",
                task.id,
                truncate(&task.prompt, 28),
                task.status,
                task.computed_priority
            ));
        }
        lines.push(format!("\n{} task(s)", self.total));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct TaskActionOutput {
    pub message: String,
    pub task: TaskSummary,
}

impl CommandOutput for TaskActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: TaskArgs, pool: SqlitePool, config: &Config, json_mode: bool) -> Result<()> {
    let queue = build_queue(pool.clone(), config);

    match args.command {
        TaskCommands::Enqueue {
            prompt,
            summary,
            agent_type,
            priority,
            prerequisites,
            feature_branch,
            deadline,
            created_by,
        } => {
            let req = EnqueueRequest {
                prompt,
                summary,
                source: TaskSource::Human,
                agent_type,
                priority,
                prerequisites,
                deadline,
                feature_branch,
                created_by,
                max_retries: Some(config.max_retries_default),
                ..Default::default()
            };
            let id = queue.enqueue(req).await.context("failed to enqueue task")?;
            let task = SqliteStoreLookup::get(&pool, id).await?;
            output(
                &TaskActionOutput {
                    message: format!("enqueued task {id}"),
                    task: TaskSummary::from(&task),
                },
                json_mode,
            );
        }
        TaskCommands::List {
            status,
            exclude_status,
            agent_type,
            feature_branch,
            limit,
        } => {
            let store = SqliteStore::new(pool);
            let filter = TaskFilter {
                status,
                exclude_status,
                source: None,
                agent_type,
                feature_branch,
            };
            let tasks = store.list_tasks(&filter, limit).await.context("failed to list tasks")?;
            output(
                &TaskListOutput {
                    total: tasks.len(),
                    tasks: tasks.iter().map(TaskSummary::from).collect(),
                },
                json_mode,
            );
        }
        TaskCommands::Get { id } => {
            let task = SqliteStoreLookup::get(&pool, id).await?;
            output(
                &TaskActionOutput {
                    message: format!("task {id}: {}", task.status.as_str()),
                    task: TaskSummary::from(&task),
                },
                json_mode,
            );
        }
        TaskCommands::Cancel { id } => {
            let task = queue.cancel_task(id).await.context("failed to cancel task")?;
            output(
                &TaskActionOutput {
                    message: format!("cancelled task {id}"),
                    task: TaskSummary::from(&task),
                },
                json_mode,
            );
        }
    }

    Ok(())
}

/// Tiny helper so `Get`/`Enqueue` don't each hand-roll a not-found error.
struct SqliteStoreLookup;

impl SqliteStoreLookup {
    async fn get(pool: &SqlitePool, id: Uuid) -> Result<Task> {
        let store = SqliteStore::new(pool.clone());
        store
            .get_task(id)
            .await
            .context("failed to read task")?
            .ok_or_else(|| anyhow::anyhow!("task {id} not found"))
    }
}
