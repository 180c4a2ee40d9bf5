//! SQLite implementation of the TaskRepository (§4.1 Store operations over
//! `tasks`, `task_results`, `task_steps`, `task_batches`).

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashSet;
use uuid::Uuid;

use crate::adapters::sqlite::{
    parse_datetime, parse_json_or_default, parse_optional_datetime, parse_optional_uuid, parse_uuid,
    JSON_SIZE_WARN_BYTES,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Batch, RetryPolicy, Task, TaskPriority, TaskResultUpdate, TaskStats, TaskStatus, TaskStep,
};
use crate::domain::ports::task_repository::{TaskFilter, TaskRepository, TaskResultEnvelope};

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    instruction: String,
    priority: String,
    status: String,
    depends_on: Option<String>,
    retry_policy: Option<String>,
    timeout_ms: i64,
    webhook_url: Option<String>,
    metadata: Option<String>,
    llm_config: Option<String>,
    batch_id: Option<String>,
    retry_count: i64,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    version: i64,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: parse_uuid(&row.id)?,
            instruction: row.instruction,
            priority: TaskPriority::from_str(&row.priority)
                .ok_or_else(|| DomainError::SerializationError(format!("invalid priority {}", row.priority)))?,
            status: TaskStatus::from_str(&row.status)
                .ok_or_else(|| DomainError::SerializationError(format!("invalid status {}", row.status)))?,
            depends_on: parse_json_or_default::<HashSet<Uuid>>(row.depends_on),
            retry_policy: row
                .retry_policy
                .map(|s| serde_json::from_str::<RetryPolicy>(&s))
                .transpose()?,
            timeout_ms: row.timeout_ms as u64,
            webhook_url: row.webhook_url,
            metadata: row
                .metadata
                .map(|s| serde_json::from_str(&s))
                .transpose()?
                .unwrap_or(serde_json::Value::Null),
            llm_config: row.llm_config.map(|s| serde_json::from_str(&s)).transpose()?,
            batch_id: parse_optional_uuid(row.batch_id)?,
            retry_count: row.retry_count as u32,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            started_at: parse_optional_datetime(row.started_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            version: row.version,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskResultRow {
    state: String,
    result: Option<String>,
    error: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    retry_count: i64,
    execution_time_ms: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct TaskStepRow {
    id: String,
    task_id: String,
    tool_name: String,
    arguments: Option<String>,
    result: Option<String>,
    created_at: String,
}

impl TryFrom<TaskStepRow> for TaskStep {
    type Error = DomainError;

    fn try_from(row: TaskStepRow) -> Result<Self, Self::Error> {
        Ok(TaskStep {
            id: parse_uuid(&row.id)?,
            task_id: parse_uuid(&row.task_id)?,
            tool_name: row.tool_name,
            arguments: row
                .arguments
                .map(|s| serde_json::from_str(&s))
                .transpose()?
                .unwrap_or(serde_json::Value::Null),
            result: row.result.map(|s| serde_json::from_str(&s)).transpose()?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn warn_if_oversized(field: &str, json: &str) {
    if json.len() > JSON_SIZE_WARN_BYTES {
        tracing::warn!(field, bytes = json.len(), "oversized JSON column");
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[tracing::instrument(skip(self, task), err)]
    async fn create_task(&self, task: &Task) -> DomainResult<()> {
        let depends_on = serde_json::to_string(&task.depends_on)?;
        let retry_policy = task.retry_policy.map(|p| serde_json::to_string(&p)).transpose()?;
        let metadata = serde_json::to_string(&task.metadata)?;
        let llm_config = task.llm_config.as_ref().map(serde_json::to_string).transpose()?;
        warn_if_oversized("metadata", &metadata);

        let result = sqlx::query(
            "INSERT INTO tasks (id, instruction, priority, status, depends_on, retry_policy,
                timeout_ms, webhook_url, metadata, llm_config, batch_id, retry_count,
                created_at, updated_at, started_at, completed_at, version)
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(task.id.to_string())
        .bind(&task.instruction)
        .bind(task.priority.as_str())
        .bind(task.status.as_str())
        .bind(depends_on)
        .bind(retry_policy)
        .bind(task.timeout_ms as i64)
        .bind(&task.webhook_url)
        .bind(metadata)
        .bind(llm_config)
        .bind(task.batch_id.map(|b| b.to_string()))
        .bind(task.retry_count as i64)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.version)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DomainError::TaskAlreadyExists(task.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_task(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn list_tasks(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        let mut sql = String::from("SELECT * FROM tasks WHERE 1=1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.priority.is_some() {
            sql.push_str(" AND priority = ?");
        }
        if filter.batch_id.is_some() {
            sql.push_str(" AND batch_id = ?");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, TaskRow>(&sql);
        if let Some(s) = filter.status {
            query = query.bind(s.as_str());
        }
        if let Some(p) = filter.priority {
            query = query.bind(p.as_str());
        }
        if let Some(b) = filter.batch_id {
            query = query.bind(b.to_string());
        }
        let limit = if filter.limit == 0 { 50 } else { filter.limit.min(100) };
        query = query.bind(limit).bind(filter.offset);

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn update_state(&self, id: Uuid, state: TaskStatus) -> DomainResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE tasks SET status = ?, updated_at = ?, version = version + 1 WHERE id = ?")
            .bind(state.as_str())
            .bind(now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn increment_retry(&self, id: Uuid) -> DomainResult<u32> {
        sqlx::query("UPDATE tasks SET retry_count = retry_count + 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        let row: (i64,) = sqlx::query_as("SELECT retry_count FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u32)
    }

    /// Upsert preserving `started_at` via COALESCE; all other present
    /// fields overwrite.
    async fn set_result(&self, id: Uuid, partial: TaskResultUpdate) -> DomainResult<()> {
        let existing: Option<TaskResultRow> =
            sqlx::query_as("SELECT * FROM task_results WHERE task_id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        let state = partial
            .state
            .map(|s| s.as_str().to_string())
            .or_else(|| existing.as_ref().map(|e| e.state.clone()))
            .unwrap_or_else(|| TaskStatus::Pending.as_str().to_string());
        let result = partial
            .result
            .map(|r| serde_json::to_string(&r))
            .transpose()?
            .or_else(|| existing.as_ref().and_then(|e| e.result.clone()));
        let error = partial.error.or_else(|| existing.as_ref().and_then(|e| e.error.clone()));
        let started_at = partial
            .started_at
            .map(|t| t.to_rfc3339())
            .or_else(|| existing.as_ref().and_then(|e| e.started_at.clone()));
        let completed_at = partial
            .completed_at
            .map(|t| t.to_rfc3339())
            .or_else(|| existing.as_ref().and_then(|e| e.completed_at.clone()));
        let retry_count = partial
            .retry_count
            .map(|c| c as i64)
            .unwrap_or_else(|| existing.as_ref().map(|e| e.retry_count).unwrap_or(0));
        let execution_time_ms = partial
            .execution_time_ms
            .map(|m| m as i64)
            .or_else(|| existing.as_ref().and_then(|e| e.execution_time_ms));

        sqlx::query(
            "INSERT INTO task_results (task_id, state, result, error, started_at, completed_at,
                retry_count, execution_time_ms)
             VALUES (?,?,?,?,?,?,?,?)
             ON CONFLICT(task_id) DO UPDATE SET
                state = excluded.state,
                result = excluded.result,
                error = excluded.error,
                started_at = COALESCE(task_results.started_at, excluded.started_at),
                completed_at = excluded.completed_at,
                retry_count = excluded.retry_count,
                execution_time_ms = excluded.execution_time_ms",
        )
        .bind(id.to_string())
        .bind(state)
        .bind(result)
        .bind(error)
        .bind(started_at)
        .bind(completed_at)
        .bind(retry_count)
        .bind(execution_time_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_step(&self, step: &TaskStep) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO task_steps (id, task_id, tool_name, arguments, result, created_at)
             VALUES (?,?,?,?,?,?)",
        )
        .bind(step.id.to_string())
        .bind(step.task_id.to_string())
        .bind(&step.tool_name)
        .bind(serde_json::to_string(&step.arguments)?)
        .bind(step.result.as_ref().map(serde_json::to_string).transpose()?)
        .bind(step.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_result(&self, id: Uuid) -> DomainResult<Option<TaskResultEnvelope>> {
        let row: Option<TaskResultRow> = sqlx::query_as("SELECT * FROM task_results WHERE task_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };

        let step_rows: Vec<TaskStepRow> =
            sqlx::query_as("SELECT * FROM task_steps WHERE task_id = ? ORDER BY created_at ASC")
                .bind(id.to_string())
                .fetch_all(&self.pool)
                .await?;
        let steps = step_rows.into_iter().map(TaskStep::try_from).collect::<DomainResult<Vec<_>>>()?;

        Ok(Some(TaskResultEnvelope {
            state: TaskStatus::from_str(&row.state)
                .ok_or_else(|| DomainError::SerializationError(format!("invalid state {}", row.state)))?,
            result: row.result.map(|s| serde_json::from_str(&s)).transpose()?,
            error: row.error,
            started_at: parse_optional_datetime(row.started_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            retry_count: row.retry_count as u32,
            execution_time_ms: row.execution_time_ms.map(|m| m as u64),
            steps,
        }))
    }

    async fn get_stats(&self) -> DomainResult<TaskStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        let mut stats = TaskStats::default();
        for (status, count) in rows {
            let count = count as u64;
            stats.total += count;
            match TaskStatus::from_str(&status) {
                Some(TaskStatus::Pending) => stats.pending = count,
                Some(TaskStatus::Queued) => stats.queued = count,
                Some(TaskStatus::WaitingDependency) => stats.waiting_dependency = count,
                Some(TaskStatus::Running) => stats.running = count,
                Some(TaskStatus::Completed) => stats.completed = count,
                Some(TaskStatus::Failed) => stats.failed = count,
                Some(TaskStatus::Cancelled) => stats.cancelled = count,
                None => {}
            }
        }
        Ok(stats)
    }

    /// Ordered by priority (critical<high<normal<low) then `createdAt ASC`
    /// — the only dispatcher-visible ordering (§4.1).
    async fn get_next_pending_tasks(&self, limit: usize) -> DomainResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM tasks
             WHERE status IN ('pending', 'queued', 'waiting_dependency')
             ORDER BY CASE priority
                WHEN 'critical' THEN 0
                WHEN 'high' THEN 1
                WHEN 'normal' THEN 2
                WHEN 'low' THEN 3
                ELSE 4 END,
                created_at ASC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn get_tasks_by_ids(&self, ids: &[Uuid]) -> DomainResult<Vec<Task>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let placeholders = std::iter::repeat("?").take(ids.len()).collect::<Vec<_>>().join(",");
        let sql = format!("SELECT * FROM tasks WHERE id IN ({placeholders})");
        let mut query = sqlx::query_as::<_, TaskRow>(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn create_batch(&self, batch: &Batch) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO task_batches (id, webhook_url, parallelism, created_at) VALUES (?,?,?,?)",
        )
        .bind(batch.id.to_string())
        .bind(&batch.webhook_url)
        .bind(batch.parallelism)
        .bind(batch.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_batch(&self, id: Uuid) -> DomainResult<Option<Batch>> {
        #[derive(sqlx::FromRow)]
        struct BatchRow {
            id: String,
            webhook_url: Option<String>,
            parallelism: Option<i64>,
            created_at: String,
        }
        let row: Option<BatchRow> = sqlx::query_as("SELECT * FROM task_batches WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            Ok(Batch {
                id: parse_uuid(&r.id)?,
                webhook_url: r.webhook_url,
                parallelism: r.parallelism.map(|p| p as u32),
                created_at: parse_datetime(&r.created_at)?,
            })
        })
        .transpose()
    }

    async fn delete_task(&self, id: Uuid) -> DomainResult<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
