//! Task repository port (§4.1 Store operations over `tasks`, `task_results`,
//! `task_steps`, `task_batches`).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Batch, Task, TaskPriority, TaskResultUpdate, TaskStats, TaskStatus, TaskStep};

/// Filter criteria for `listTasks`.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub batch_id: Option<Uuid>,
    pub limit: u32,
    pub offset: u32,
}

/// The full result envelope returned by `getResult` (§3 TaskResult).
#[derive(Debug, Clone)]
pub struct TaskResultEnvelope {
    pub state: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub retry_count: u32,
    pub execution_time_ms: Option<u64>,
    pub steps: Vec<TaskStep>,
}

/// Repository interface for Task/TaskResult/Batch persistence.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert; fails (`TaskAlreadyExists`) on id collision.
    async fn create_task(&self, task: &Task) -> DomainResult<()>;

    async fn get_task(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// Ordered by `createdAt DESC`.
    async fn list_tasks(&self, filter: TaskFilter) -> DomainResult<Vec<Task>>;

    /// Atomically sets `state` and `updatedAt=now`.
    async fn update_state(&self, id: Uuid, state: TaskStatus) -> DomainResult<()>;

    /// Atomic +1, returns the new count.
    async fn increment_retry(&self, id: Uuid) -> DomainResult<u32>;

    /// Upsert; preserves `startedAt` via COALESCE, replaces remaining
    /// present fields.
    async fn set_result(&self, id: Uuid, partial: TaskResultUpdate) -> DomainResult<()>;

    /// Append a tool-invocation record.
    async fn add_step(&self, step: &TaskStep) -> DomainResult<()>;

    async fn get_result(&self, id: Uuid) -> DomainResult<Option<TaskResultEnvelope>>;

    async fn get_stats(&self) -> DomainResult<TaskStats>;

    /// Tasks in `{pending, queued, waiting_dependency}`, ordered by
    /// priority (critical<high<normal<low) then `createdAt ASC`.
    async fn get_next_pending_tasks(&self, limit: usize) -> DomainResult<Vec<Task>>;

    /// Fetch tasks by id, used by the scheduler to eagerly load
    /// dependency ids missing from the candidate batch.
    async fn get_tasks_by_ids(&self, ids: &[Uuid]) -> DomainResult<Vec<Task>>;

    async fn create_batch(&self, batch: &Batch) -> DomainResult<()>;

    async fn get_batch(&self, id: Uuid) -> DomainResult<Option<Batch>>;

    /// Cascades to steps and result.
    async fn delete_task(&self, id: Uuid) -> DomainResult<()>;
}
