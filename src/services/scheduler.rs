//! Scheduler (§4.4): the polling loop that dispatches pending tasks to
//! `Executor`, bounded by `maxConcurrent` and gated by `DependencyResolver`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{Task, TaskStatus};
use crate::domain::ports::task_repository::TaskRepository;
use crate::services::dependency_resolver;
use crate::services::executor::Executor;
use crate::services::retry_manager;

pub struct Scheduler {
    repo: Arc<dyn TaskRepository>,
    executor: Arc<Executor>,
    semaphore: Arc<Semaphore>,
    poll_interval: Duration,
    running_tokens: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl Scheduler {
    pub fn new(repo: Arc<dyn TaskRepository>, executor: Arc<Executor>, max_concurrent: usize, poll_interval: Duration) -> Self {
        Self {
            repo,
            executor,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            poll_interval,
            running_tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs the polling loop until `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.tick(shutdown.clone()).await {
                        warn!(error = %err, "scheduler tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// One scheduling pass: dispatches as many executable tasks as current
    /// capacity allows.
    pub async fn tick(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let capacity = self.semaphore.available_permits();
        if capacity == 0 {
            return Ok(());
        }

        let candidates = self.repo.get_next_pending_tasks(2 * capacity).await?;
        if candidates.is_empty() {
            return Ok(());
        }

        let mut task_map: HashMap<Uuid, Task> = candidates.iter().cloned().map(|t| (t.id, t)).collect();
        let missing: Vec<Uuid> = candidates
            .iter()
            .flat_map(|t| t.depends_on.iter().copied())
            .filter(|id| !task_map.contains_key(id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if !missing.is_empty() {
            for dep in self.repo.get_tasks_by_ids(&missing).await? {
                task_map.insert(dep.id, dep);
            }
        }

        let mut dispatched = 0usize;
        for task in &candidates {
            if dispatched >= capacity {
                break;
            }

            if dependency_resolver::has_failed_dependency(task, &task_map) {
                self.repo.update_state(task.id, TaskStatus::Cancelled).await?;
                continue;
            }

            if !dependency_resolver::can_execute(task, &task_map) {
                if task.status != TaskStatus::WaitingDependency {
                    self.repo.update_state(task.id, TaskStatus::WaitingDependency).await?;
                }
                continue;
            }

            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                break;
            };
            self.repo.update_state(task.id, TaskStatus::Queued).await?;
            dispatched += 1;

            let task = task.clone();
            let repo = self.repo.clone();
            let executor = self.executor.clone();
            let running_tokens = self.running_tokens.clone();
            let mut shutdown = shutdown.clone();
            let cancel = CancellationToken::new();
            {
                let mut tokens = running_tokens.lock().await;
                tokens.insert(task.id, cancel.clone());
            }

            tokio::spawn(async move {
                let task_id = task.id;
                let retry_policy = task.retry_policy;
                if let Err(err) = executor.execute(task, cancel, None).await {
                    warn!(task_id = %task_id, error = %err, "executor returned an error");
                }
                running_tokens.lock().await.remove(&task_id);
                drop(permit);

                if let Ok(Some(current)) = repo.get_task(task_id).await {
                    if current.status == TaskStatus::Failed && retry_manager::should_retry(current.retry_count, retry_policy.as_ref()) {
                        let _ = repo.increment_retry(task_id).await;
                        retry_manager::wait_for_retry(current.retry_count, retry_policy.as_ref(), &mut shutdown).await;
                        let _ = repo.update_state(task_id, TaskStatus::Pending).await;
                        info!(task_id = %task_id, "retrying failed task");
                    }
                }
            });
        }

        Ok(())
    }

    /// `cancelTask(id)`: if running, signals the executor's cancellation
    /// token; unconditionally marks the task cancelled.
    pub async fn cancel_task(&self, id: Uuid) -> Result<()> {
        let tokens = self.running_tokens.lock().await;
        if let Some(token) = tokens.get(&id) {
            token.cancel();
        }
        drop(tokens);
        self.repo.update_state(id, TaskStatus::Cancelled).await?;
        Ok(())
    }
}
