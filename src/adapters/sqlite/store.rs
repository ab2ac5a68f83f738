//! `SqliteStore`: the `Store` port backed by a single-writer SQLite
//! database. Grounded on the teacher's
//! `adapters::sqlite::task_repository::SqliteTaskRepository` — the
//! `TaskRow`/`TryFrom` parsing idiom, the atomic compare-and-swap claim,
//! the dynamic filter-building pattern — extended with the tree, prune,
//! and checkpoint operations `spec.md` §4.1 requires.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{QueueError, QueueResult};
use crate::domain::models::{
    BlockedTask, Checkpoint, DependencyType, PruneResult, Task, TaskDependency, TaskSource,
    TaskStatus,
};
use crate::domain::ports::{PruneFilters, Store, TaskFilter, TaskTreeRow, VacuumMode};

use super::{parse_datetime, parse_optional_datetime, parse_optional_uuid, parse_uuid};

/// Above this size, a JSON payload column is logged as suspiciously large
/// rather than silently accepted.
const JSON_SIZE_WARN_BYTES: usize = 64 * 1024;

/// Chunk size for batched `DELETE ... WHERE id IN (...)`, staying under
/// SQLite's default bound-parameter limit (`spec.md` §4.1).
const PRUNE_BATCH_SIZE: usize = 900;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    prompt: String,
    summary: Option<String>,
    agent_type: String,
    priority: i64,
    computed_priority: f64,
    status: String,
    input_data: Option<String>,
    result_data: Option<String>,
    error_message: Option<String>,
    retry_count: i64,
    max_retries: i64,
    max_execution_timeout_seconds: i64,
    submitted_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    updated_at: String,
    created_by: String,
    parent_task_id: Option<String>,
    session_id: Option<String>,
    source_type: String,
    dependency_depth: i64,
    deadline: Option<String>,
    estimated_duration_seconds: Option<i64>,
    feature_branch: Option<String>,
    task_branch: Option<String>,
    worktree_path: Option<String>,
    version: i64,
}

impl TryFrom<TaskRow> for Task {
    type Error = QueueError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: parse_uuid(&row.id)?,
            prompt: row.prompt,
            summary: row.summary,
            agent_type: row.agent_type,
            priority: row.priority.clamp(0, 10) as u8,
            computed_priority: row.computed_priority,
            status: TaskStatus::from_str_opt(&row.status)
                .ok_or_else(|| QueueError::FatalStore(format!("unknown status {:?}", row.status)))?,
            input_data: row.input_data,
            result_data: row.result_data,
            error_message: row.error_message,
            retry_count: row.retry_count.max(0) as u32,
            max_retries: row.max_retries.max(0) as u32,
            max_execution_timeout_seconds: row.max_execution_timeout_seconds.max(0) as u64,
            submitted_at: parse_datetime(&row.submitted_at)?,
            started_at: parse_optional_datetime(row.started_at.as_deref())?,
            completed_at: parse_optional_datetime(row.completed_at.as_deref())?,
            updated_at: parse_datetime(&row.updated_at)?,
            created_by: row.created_by,
            parent_task_id: parse_optional_uuid(row.parent_task_id.as_deref())?,
            session_id: row.session_id,
            source: TaskSource::from_db_str(&row.source_type),
            dependency_depth: row.dependency_depth.max(0) as u32,
            deadline: parse_optional_datetime(row.deadline.as_deref())?,
            estimated_duration_seconds: row.estimated_duration_seconds.map(|v| v.max(0) as u64),
            feature_branch: row.feature_branch,
            task_branch: row.task_branch,
            worktree_path: row.worktree_path,
            version: row.version.max(0) as u32,
        })
    }
}

fn warn_if_oversized(field: &str, task_id: Uuid, payload: &Option<String>) {
    if let Some(data) = payload {
        if data.len() > JSON_SIZE_WARN_BYTES {
            tracing::warn!(task_id = %task_id, field, bytes = data.len(), "oversized payload column");
        }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_task(&self, task: &Task) -> QueueResult<()> {
        task.validate().map_err(QueueError::Validation)?;
        warn_if_oversized("input_data", task.id, &task.input_data);
        warn_if_oversized("result_data", task.id, &task.result_data);

        let result = sqlx::query(
            "INSERT INTO tasks (
                id, prompt, summary, agent_type, priority, computed_priority, status,
                input_data, result_data, error_message, retry_count, max_retries,
                max_execution_timeout_seconds, submitted_at, started_at, completed_at,
                updated_at, created_by, parent_task_id, session_id, source_type,
                dependency_depth, deadline, estimated_duration_seconds, feature_branch,
                task_branch, worktree_path, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.id.to_string())
        .bind(&task.prompt)
        .bind(&task.summary)
        .bind(&task.agent_type)
        .bind(i64::from(task.priority))
        .bind(task.computed_priority)
        .bind(task.status.as_str())
        .bind(&task.input_data)
        .bind(&task.result_data)
        .bind(&task.error_message)
        .bind(i64::from(task.retry_count))
        .bind(i64::from(task.max_retries))
        .bind(task.max_execution_timeout_seconds as i64)
        .bind(task.submitted_at.to_rfc3339())
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.updated_at.to_rfc3339())
        .bind(&task.created_by)
        .bind(task.parent_task_id.map(|id| id.to_string()))
        .bind(&task.session_id)
        .bind(task.source.as_db_str())
        .bind(i64::from(task.dependency_depth))
        .bind(task.deadline.map(|t| t.to_rfc3339()))
        .bind(task.estimated_duration_seconds.map(|v| v as i64))
        .bind(&task.feature_branch)
        .bind(&task.task_branch)
        .bind(&task.worktree_path)
        .bind(i64::from(task.version))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(QueueError::duplicate_key(task.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_task(&self, id: Uuid) -> QueueResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn list_tasks(&self, filters: &TaskFilter, limit: i64) -> QueueResult<Vec<Task>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM tasks WHERE 1 = 1");

        if let Some(status) = filters.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(exclude) = filters.exclude_status {
            qb.push(" AND status != ").push_bind(exclude.as_str());
        }
        if let Some(source) = &filters.source {
            qb.push(" AND source_type = ").push_bind(source.as_db_str().to_string());
        }
        if let Some(agent_type) = &filters.agent_type {
            qb.push(" AND agent_type = ").push_bind(agent_type.clone());
        }
        if let Some(branch) = &filters.feature_branch {
            qb.push(" AND feature_branch = ").push_bind(branch.clone());
        }
        qb.push(" ORDER BY computed_priority DESC, submitted_at ASC LIMIT ").push_bind(limit);

        let rows = qb.build_query_as::<TaskRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn update_task_status(
        &self,
        id: Uuid,
        new_status: TaskStatus,
        error_message: Option<String>,
        result_data: Option<String>,
    ) -> QueueResult<Task> {
        let current = self
            .get_task(id)
            .await?
            .ok_or_else(|| QueueError::not_found("task", id))?;

        if !current.status.can_transition_to(new_status) {
            return Err(QueueError::Validation(format!(
                "invalid transition from {} to {} for task {id}",
                current.status, new_status
            )));
        }

        let now = Utc::now();
        let started_at = if new_status == TaskStatus::Running {
            Some(now.to_rfc3339())
        } else {
            current.started_at.map(|t| t.to_rfc3339())
        };
        let completed_at = if new_status.is_terminal() {
            Some(now.to_rfc3339())
        } else {
            None
        };

        let affected = sqlx::query(
            "UPDATE tasks SET status = ?, error_message = COALESCE(?, error_message),
                result_data = COALESCE(?, result_data), started_at = ?, completed_at = ?,
                updated_at = ?, version = version + 1
             WHERE id = ? AND status = ?",
        )
        .bind(new_status.as_str())
        .bind(error_message)
        .bind(result_data)
        .bind(started_at)
        .bind(completed_at)
        .bind(now.to_rfc3339())
        .bind(id.to_string())
        .bind(current.status.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(QueueError::TransientStore(sqlx::Error::RowNotFound));
        }

        self.get_task(id).await?.ok_or_else(|| QueueError::not_found("task", id))
    }

    async fn update_task_priority(&self, id: Uuid, computed_priority: f64, dependency_depth: u32) -> QueueResult<()> {
        let affected = sqlx::query(
            "UPDATE tasks SET computed_priority = ?, dependency_depth = ?, updated_at = ? WHERE id = ?",
        )
        .bind(computed_priority)
        .bind(i64::from(dependency_depth))
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(QueueError::not_found("task", id));
        }
        Ok(())
    }

    async fn claim_next_ready_task(&self) -> QueueResult<Option<Task>> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query_as::<_, TaskRow>(
            "UPDATE tasks SET status = 'running', started_at = ?, updated_at = ?, version = version + 1
             WHERE id = (
                SELECT id FROM tasks WHERE status = 'ready'
                ORDER BY computed_priority DESC, submitted_at ASC LIMIT 1
             )
             AND status = 'ready'
             RETURNING *",
        )
        .bind(&now)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Task::try_from).transpose()
    }

    async fn record_task_failure(&self, id: Uuid, error_message: String) -> QueueResult<Task> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query_as::<_, TaskRow>(
            "UPDATE tasks SET
                retry_count = retry_count + 1,
                status = CASE WHEN retry_count + 1 < max_retries THEN 'ready' ELSE 'failed' END,
                started_at = CASE WHEN retry_count + 1 < max_retries THEN NULL ELSE started_at END,
                completed_at = CASE WHEN retry_count + 1 < max_retries THEN NULL ELSE ? END,
                error_message = ?,
                updated_at = ?,
                version = version + 1
             WHERE id = ? AND status = 'running'
             RETURNING *",
        )
        .bind(&now)
        .bind(&error_message)
        .bind(&now)
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Task::try_from(row),
            None => Err(QueueError::not_found("task", id)),
        }
    }

    async fn average_computed_priority(&self) -> QueueResult<f64> {
        let avg: Option<f64> = sqlx::query_scalar("SELECT AVG(computed_priority) FROM tasks")
            .fetch_one(&self.pool)
            .await?;
        Ok(avg.unwrap_or(0.0))
    }

    async fn insert_dependency(&self, dep: &TaskDependency) -> QueueResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO task_dependencies (dependent_task_id, prerequisite_task_id, dependency_type)
             VALUES (?, ?, ?)",
        )
        .bind(dep.dependent_task_id.to_string())
        .bind(dep.prerequisite_task_id.to_string())
        .bind(dep.dependency_type.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_dependencies(&self, task_id: Uuid) -> QueueResult<Vec<TaskDependency>> {
        fetch_dependencies(&self.pool, "dependent_task_id", task_id).await
    }

    async fn get_dependents(&self, task_id: Uuid) -> QueueResult<Vec<TaskDependency>> {
        fetch_dependencies(&self.pool, "prerequisite_task_id", task_id).await
    }

    async fn list_all_dependency_edges(&self) -> QueueResult<Vec<TaskDependency>> {
        let rows = sqlx::query("SELECT dependent_task_id, prerequisite_task_id, dependency_type FROM task_dependencies")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_dependency).collect()
    }

    async fn count_blocked_downstream(&self, task_id: Uuid) -> QueueResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM task_dependencies td
             JOIN tasks t ON t.id = td.dependent_task_id
             WHERE td.prerequisite_task_id = ? AND t.status NOT IN ('completed', 'failed', 'cancelled')",
        )
        .bind(task_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn get_task_tree_with_status(
        &self,
        root_ids: &[Uuid],
        max_depth: Option<u32>,
        filter_statuses: Option<&[TaskStatus]>,
    ) -> QueueResult<Vec<TaskTreeRow>> {
        if root_ids.is_empty() {
            return Ok(vec![]);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "WITH RECURSIVE tree(id, parent_id, status, depth) AS (
                SELECT id, parent_task_id, status, 0 FROM tasks WHERE id IN (",
        );
        {
            let mut separated = qb.separated(", ");
            for id in root_ids {
                separated.push_bind(id.to_string());
            }
        }
        qb.push(")
                UNION ALL
                SELECT t.id, t.parent_task_id, t.status, tree.depth + 1
                FROM tasks t JOIN tree ON t.parent_task_id = tree.id");
        if let Some(max_depth) = max_depth {
            qb.push(" WHERE tree.depth + 1 <= ").push_bind(i64::from(max_depth));
        }
        qb.push(") SELECT id, parent_id, status, depth FROM tree WHERE 1 = 1");
        if let Some(statuses) = filter_statuses {
            if !statuses.is_empty() {
                qb.push(" AND status IN (");
                let mut separated = qb.separated(", ");
                for status in statuses {
                    separated.push_bind(status.as_str());
                }
                qb.push_unseparated(")");
            }
        }
        qb.push(" ORDER BY depth ASC, id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> QueueResult<TaskTreeRow> {
                let id: String = row.try_get("id")?;
                let parent_id: Option<String> = row.try_get("parent_id")?;
                let status: String = row.try_get("status")?;
                let depth: i64 = row.try_get("depth")?;
                Ok(TaskTreeRow {
                    id: parse_uuid(&id)?,
                    parent_id: parse_optional_uuid(parent_id.as_deref())?,
                    status: TaskStatus::from_str_opt(&status)
                        .ok_or_else(|| QueueError::FatalStore(format!("unknown status {status:?}")))?,
                    depth: depth.max(0) as u32,
                })
            })
            .collect()
    }

    async fn prune_tasks(&self, filters: &PruneFilters) -> QueueResult<PruneResult> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT id FROM tasks WHERE status IN (");
        {
            let mut separated = qb.separated(", ");
            for status in &filters.allowed_statuses {
                separated.push_bind(status.as_str());
            }
        }
        qb.push(")");
        if let Some(branch) = &filters.feature_branch {
            qb.push(" AND feature_branch = ").push_bind(branch.clone());
        }
        let candidate_rows = qb.build().fetch_all(&self.pool).await?;
        let candidates: Vec<Uuid> = candidate_rows
            .iter()
            .map(|row| -> QueueResult<Uuid> { parse_uuid(&row.try_get::<String, _>("id")?) })
            .collect::<QueueResult<_>>()?;

        if candidates.is_empty() {
            return Ok(PruneResult::dry_run(vec![]));
        }

        let mut deletable: Vec<(Uuid, u32)> = vec![]; // (id, depth) for ordering deepest-first
        let mut blocked = vec![];

        for &root in &candidates {
            if filters.recursive {
                let subtree = self
                    .get_task_tree_with_status(&[root], None, None)
                    .await?;
                let non_terminal: Vec<Uuid> = subtree
                    .iter()
                    .filter(|row| !row.status.is_terminal())
                    .map(|row| row.id)
                    .collect();
                if non_terminal.is_empty() {
                    for row in subtree {
                        deletable.push((row.id, row.depth));
                    }
                } else {
                    blocked.push(BlockedTask::with_dependents(root, non_terminal));
                }
            } else {
                deletable.push((root, 0));
            }
        }

        // Deepest-first to avoid transient FK violations while deleting
        // within a single transaction.
        deletable.sort_by(|a, b| b.1.cmp(&a.1));
        let ids: Vec<Uuid> = deletable.into_iter().map(|(id, _)| id).collect();

        if filters.dry_run {
            return Ok(PruneResult::dry_run(blocked));
        }

        let mut tx = self.pool.begin().await?;
        for chunk in ids.chunks(PRUNE_BATCH_SIZE) {
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM tasks WHERE id IN (");
            {
                let mut separated = qb.separated(", ");
                for id in chunk {
                    separated.push_bind(id.to_string());
                }
            }
            qb.push(")");
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        let bytes_reclaimed = self.maybe_vacuum(filters.vacuum, ids.len()).await?;

        Ok(PruneResult::actual_deletion(ids, blocked, bytes_reclaimed))
    }

    async fn get_status_counts(&self) -> QueueResult<HashMap<TaskStatus, i64>> {
        let rows = sqlx::query("SELECT status, COUNT(*) as cnt FROM tasks GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = HashMap::new();
        for row in rows {
            let status: String = row.try_get("status")?;
            let cnt: i64 = row.try_get("cnt")?;
            if let Some(status) = TaskStatus::from_str_opt(&status) {
                counts.insert(status, cnt);
            }
        }
        Ok(counts)
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> QueueResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO checkpoints (task_id, iteration, state, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(checkpoint.task_id.to_string())
        .bind(i64::from(checkpoint.iteration))
        .bind(&checkpoint.state)
        .bind(checkpoint.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_latest_checkpoint(&self, task_id: Uuid) -> QueueResult<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT task_id, iteration, state, created_at FROM checkpoints
             WHERE task_id = ? ORDER BY iteration DESC LIMIT 1",
        )
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> QueueResult<Checkpoint> {
            let iteration: i64 = row.try_get("iteration")?;
            let state: String = row.try_get("state")?;
            let created_at: String = row.try_get("created_at")?;
            Ok(Checkpoint {
                task_id,
                iteration: iteration.max(0) as u32,
                state,
                created_at: parse_datetime(&created_at)?,
            })
        })
        .transpose()
    }

    async fn explain_query_plan(&self, sql: &str) -> QueueResult<Vec<String>> {
        let rows = sqlx::query(&format!("EXPLAIN QUERY PLAN {sql}"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> QueueResult<String> { Ok(row.try_get::<String, _>("detail")?) })
            .collect()
    }
}

impl SqliteStore {
    async fn maybe_vacuum(&self, mode: VacuumMode, deleted_count: usize) -> QueueResult<Option<u64>> {
        let should_vacuum = match mode {
            VacuumMode::Never => false,
            VacuumMode::Conditional => deleted_count >= 100,
            VacuumMode::Always => true,
        };
        if !should_vacuum {
            return Ok(None);
        }

        let (before_pages, page_size): (i64, i64) = (
            sqlx::query_scalar("PRAGMA page_count").fetch_one(&self.pool).await?,
            sqlx::query_scalar("PRAGMA page_size").fetch_one(&self.pool).await?,
        );
        sqlx::raw_sql("VACUUM").execute(&self.pool).await?;
        let after_pages: i64 = sqlx::query_scalar("PRAGMA page_count").fetch_one(&self.pool).await?;

        let reclaimed = (before_pages - after_pages).max(0) as u64 * page_size.max(0) as u64;
        Ok(Some(reclaimed))
    }
}

fn row_to_dependency(row: &sqlx::sqlite::SqliteRow) -> QueueResult<TaskDependency> {
    let dependent: String = row.try_get("dependent_task_id")?;
    let prerequisite: String = row.try_get("prerequisite_task_id")?;
    let dep_type: String = row.try_get("dependency_type")?;
    Ok(TaskDependency {
        dependent_task_id: parse_uuid(&dependent)?,
        prerequisite_task_id: parse_uuid(&prerequisite)?,
        dependency_type: DependencyType::from_str_opt(&dep_type).unwrap_or(DependencyType::Sequential),
    })
}

async fn fetch_dependencies(pool: &SqlitePool, column: &str, task_id: Uuid) -> QueueResult<Vec<TaskDependency>> {
    let sql = format!(
        "SELECT dependent_task_id, prerequisite_task_id, dependency_type FROM task_dependencies WHERE {column} = ?"
    );
    let rows = sqlx::query(&sql).bind(task_id.to_string()).fetch_all(pool).await?;
    rows.iter().map(row_to_dependency).collect()
}
