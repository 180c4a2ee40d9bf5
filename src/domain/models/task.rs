//! Task domain model.
//!
//! A task is a single browser-automation instruction dispatched by the
//! scheduler to the external chat endpoint, subject to priority,
//! dependency, retry, and timeout constraints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Status of a task in the execution pipeline.
///
/// ```text
/// pending ──► queued ──► running ──► completed
///    ▲           │           │
///    │           │           ├──► failed ──► (retry eligible) ──► pending
///    │           │           │
///    │           ▼           ▼
///    └── waiting_dependency  cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    WaitingDependency,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::WaitingDependency => "waiting_dependency",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "queued" => Some(Self::Queued),
            "waiting_dependency" => Some(Self::WaitingDependency),
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal per I3/universal invariants: `completed`, `cancelled`, and
    /// `failed` (only once retries are exhausted — callers enforce that
    /// before transitioning here).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Valid transitions from this status. `Failed` can return to `Pending`
    /// only via the scheduler's retry path (§4.4), never directly; callers
    /// that need that edge go through [`Task::retry`].
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Queued, Self::WaitingDependency, Self::Cancelled],
            Self::Queued => &[Self::Running, Self::WaitingDependency, Self::Cancelled],
            Self::WaitingDependency => &[Self::Queued, Self::Pending, Self::Cancelled],
            Self::Running => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed => &[],
            Self::Failed => &[Self::Pending],
            Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        self.valid_transitions().contains(&target)
    }
}

/// Priority, highest to lowest for dispatch ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "normal" => Some(Self::Normal),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Ordinal used for `ORDER BY` ties in `getNextPendingTasks`: lower is
    /// dispatched first (critical=0 .. low=3).
    pub fn dispatch_rank(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

/// Overridable retry policy. Defaults per §4.3: maxRetries=3, backoffMs=1000,
/// multiplier=2, ceiling 60000.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Per-tool-invocation record appended during execution (§4.1 `addStep`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    pub id: Uuid,
    pub task_id: Uuid,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// The task entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub instruction: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub depends_on: HashSet<Uuid>,
    pub retry_policy: Option<RetryPolicy>,
    pub timeout_ms: u64,
    pub webhook_url: Option<String>,
    pub metadata: serde_json::Value,
    pub llm_config: Option<serde_json::Value>,
    pub batch_id: Option<Uuid>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

/// Default per-task timeout (§4.4): wraps only the chat call + SSE parse.
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;

impl Task {
    pub fn new(instruction: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            instruction: instruction.into(),
            priority: TaskPriority::default(),
            status: TaskStatus::default(),
            depends_on: HashSet::new(),
            retry_policy: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            webhook_url: None,
            metadata: serde_json::Value::Null,
            llm_config: None,
            batch_id: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            version: 1,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependency(mut self, dep: Uuid) -> Self {
        self.depends_on.insert(dep);
        self
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = Uuid>) -> Self {
        self.depends_on.extend(deps);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_llm_config(mut self, llm_config: serde_json::Value) -> Self {
        self.llm_config = Some(llm_config);
        self
    }

    pub fn with_batch_id(mut self, batch_id: Uuid) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    pub fn effective_max_retries(&self) -> u32 {
        self.retry_policy
            .map(|p| p.max_retries)
            .unwrap_or(RetryPolicy::default().max_retries)
    }

    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        self.status.can_transition_to(target)
    }

    /// Enforce the FSM; updates `updated_at`/`version` and sets
    /// `started_at`/`completed_at` side effects.
    pub fn transition_to(&mut self, target: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(target) {
            return Err(format!(
                "invalid transition from {} to {}",
                self.status.as_str(),
                target.as_str()
            ));
        }
        let now = Utc::now();
        if target == TaskStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if target.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = target;
        self.updated_at = now;
        self.version += 1;
        Ok(())
    }

    /// Escape hatch that bypasses the FSM, for crash recovery and
    /// reconciliation only. Every call is logged.
    pub fn force_status(&mut self, target: TaskStatus) {
        tracing::warn!(
            task_id = %self.id,
            from = self.status.as_str(),
            to = target.as_str(),
            "forcing task status outside state machine"
        );
        let now = Utc::now();
        if target == TaskStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if target.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = target;
        self.updated_at = now;
        self.version += 1;
    }

    /// Scheduler's retry path (§4.4): `failed` → `pending`, incrementing
    /// `retry_count`. Never re-runs dependents; steps and prior retry
    /// count are preserved.
    pub fn retry(&mut self) -> Result<(), String> {
        if self.status != TaskStatus::Failed {
            return Err(format!(
                "cannot retry task in status {}",
                self.status.as_str()
            ));
        }
        self.retry_count += 1;
        self.transition_to(TaskStatus::Pending)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.instruction.trim().is_empty() {
            return Err("instruction must not be empty".to_string());
        }
        if self.timeout_ms < 1000 {
            return Err("timeout must be at least 1000ms".to_string());
        }
        if let Some(url) = &self.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err("webhookUrl must be http or https".to_string());
            }
        }
        Ok(())
    }
}

/// Upsert-style task result row (§3 TaskResult, I1, I5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub state: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub execution_time_ms: Option<u64>,
}

/// Partial update applied via `setResult` — `started_at` is preserved via
/// COALESCE, all other present fields overwrite.
#[derive(Debug, Clone, Default)]
pub struct TaskResultUpdate {
    pub state: Option<TaskStatus>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: Option<u32>,
    pub execution_time_ms: Option<u64>,
}

/// A batch of tasks sharing an id and optional webhook/parallelism.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub webhook_url: Option<String>,
    pub parallelism: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counts for `getStats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub pending: u64,
    pub queued: u64,
    pub waiting_dependency: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_defaults_to_pending() {
        let task = Task::new("do the thing");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Normal);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn valid_transitions_succeed() {
        let mut task = Task::new("x");
        assert!(task.transition_to(TaskStatus::Queued).is_ok());
        assert!(task.transition_to(TaskStatus::Running).is_ok());
        assert!(task.started_at.is_some());
        assert!(task.transition_to(TaskStatus::Completed).is_ok());
        assert!(task.completed_at.is_some());
        assert!(task.status.is_terminal());
    }

    #[test]
    fn invalid_transition_rejected() {
        let mut task = Task::new("x");
        assert!(task.transition_to(TaskStatus::Completed).is_err());
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut task = Task::new("x");
        task.transition_to(TaskStatus::Queued).unwrap();
        task.transition_to(TaskStatus::Running).unwrap();
        task.transition_to(TaskStatus::Cancelled).unwrap();
        assert!(task.transition_to(TaskStatus::Pending).is_err());
    }

    #[test]
    fn retry_requires_failed_status() {
        let mut task = Task::new("x");
        assert!(task.retry().is_err());
        task.transition_to(TaskStatus::Queued).unwrap();
        task.transition_to(TaskStatus::Running).unwrap();
        task.transition_to(TaskStatus::Failed).unwrap();
        assert!(task.retry().is_ok());
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
    }

    #[test]
    fn force_status_bypasses_fsm() {
        let mut task = Task::new("x");
        let version_before = task.version;
        task.force_status(TaskStatus::Completed);
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.version > version_before);
    }

    #[test]
    fn validate_rejects_empty_instruction() {
        let task = Task::new("   ");
        assert!(task.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_http_webhook() {
        let task = Task::new("x").with_webhook_url("ftp://evil.example");
        assert!(task.validate().is_err());
    }

    #[test]
    fn priority_dispatch_rank_orders_critical_first() {
        assert!(TaskPriority::Critical.dispatch_rank() < TaskPriority::High.dispatch_rank());
        assert!(TaskPriority::High.dispatch_rank() < TaskPriority::Normal.dispatch_rank());
        assert!(TaskPriority::Normal.dispatch_rank() < TaskPriority::Low.dispatch_rank());
    }
}
