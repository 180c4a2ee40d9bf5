//! End-to-end Task Queue scenarios: priority/FIFO dispatch order,
//! dependency gating, failed-dependency cancellation, and retry backoff
//! accounting.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use controlplane::adapters::sqlite::{create_migrated_test_pool, SqliteTaskRepository};
use controlplane::domain::models::{RetryPolicy, Task, TaskPriority, TaskStatus};
use controlplane::domain::ports::task_repository::TaskRepository;
use controlplane::services::{Executor, Scheduler};
use tokio::sync::watch;

async fn task_repo() -> Arc<dyn TaskRepository> {
    let pool = create_migrated_test_pool().await.unwrap();
    Arc::new(SqliteTaskRepository::new(pool))
}

fn scheduler(repo: Arc<dyn TaskRepository>, max_concurrent: usize) -> Arc<Scheduler> {
    let executor = Arc::new(Executor::new(repo.clone(), None, "http://127.0.0.1:1/chat".to_string(), 10_000));
    Arc::new(Scheduler::new(repo, executor, max_concurrent, Duration::from_millis(50)))
}

/// Scenario 1: with `maxConcurrent=1`, dispatch order follows priority
/// first, creation order second — B (critical) dispatches before A and C
/// (both normal, A created first).
#[tokio::test]
async fn priority_and_fifo_dispatch_order() {
    let repo = task_repo().await;

    let mut a = Task::new("a").with_priority(TaskPriority::Normal);
    a.created_at = Utc::now();
    repo.create_task(&a).await.unwrap();

    let mut b = Task::new("b").with_priority(TaskPriority::Critical);
    b.created_at = Utc::now() + chrono::Duration::milliseconds(1);
    repo.create_task(&b).await.unwrap();

    let mut c = Task::new("c").with_priority(TaskPriority::Normal);
    c.created_at = Utc::now() + chrono::Duration::milliseconds(2);
    repo.create_task(&c).await.unwrap();

    let next = repo.get_next_pending_tasks(10).await.unwrap();
    let order: Vec<_> = next.iter().map(|t| t.instruction.clone()).collect();
    assert_eq!(order, vec!["b".to_string(), "a".to_string(), "c".to_string()]);
}

/// Scenario 2: dependency gating. B depends on A; a tick while A is
/// pending moves B to `waiting_dependency`. Once A completes, the next
/// tick dispatches B (it leaves `waiting_dependency`/`pending`).
#[tokio::test]
async fn dependency_gating_releases_after_parent_completes() {
    let repo = task_repo().await;
    let scheduler = scheduler(repo.clone(), 4);
    let (_tx, rx) = watch::channel(false);

    let a = Task::new("a");
    repo.create_task(&a).await.unwrap();
    let b = Task::new("b").with_dependency(a.id);
    repo.create_task(&b).await.unwrap();

    scheduler.tick(rx.clone()).await.unwrap();
    let reloaded_b = repo.get_task(b.id).await.unwrap().unwrap();
    assert_eq!(reloaded_b.status, TaskStatus::WaitingDependency);

    repo.update_state(a.id, TaskStatus::Completed).await.unwrap();
    scheduler.tick(rx).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let reloaded_b = repo.get_task(b.id).await.unwrap().unwrap();
    assert_ne!(reloaded_b.status, TaskStatus::WaitingDependency);
}

/// Scenario 3: failed dependency cancellation. A task depending on a
/// permanently failed parent is cancelled, not marked failed itself.
#[tokio::test]
async fn failed_dependency_cancels_dependent_task() {
    let repo = task_repo().await;
    let scheduler = scheduler(repo.clone(), 4);
    let (_tx, rx) = watch::channel(false);

    let mut a = Task::new("a");
    a.status = TaskStatus::Failed;
    repo.create_task(&a).await.unwrap();
    let b = Task::new("b").with_dependency(a.id);
    repo.create_task(&b).await.unwrap();

    scheduler.tick(rx).await.unwrap();

    let reloaded_b = repo.get_task(b.id).await.unwrap().unwrap();
    assert_eq!(reloaded_b.status, TaskStatus::Cancelled);
}

/// Scenario 4: retry backoff accounting. With `{maxRetries:2,
/// backoffMs:100, multiplier:3}`, three consecutive failures leave
/// `retryCount` at 2 and the task terminally `failed`; backoff grows
/// 100ms then 300ms between attempts.
#[tokio::test]
async fn retry_policy_exhausts_after_max_retries() {
    use controlplane::services::retry_manager;

    let repo = task_repo().await;
    let policy = RetryPolicy { max_retries: 2, backoff_ms: 100, backoff_multiplier: 3.0 };
    let task = Task::new("flaky").with_retry_policy(policy);
    repo.create_task(&task).await.unwrap();

    let mut observed_backoffs = Vec::new();
    for _ in 0..3 {
        repo.update_state(task.id, TaskStatus::Failed).await.unwrap();
        let current = repo.get_task(task.id).await.unwrap().unwrap();
        if retry_manager::should_retry(current.retry_count, current.retry_policy.as_ref()) {
            observed_backoffs.push(retry_manager::get_backoff_ms(current.retry_count, current.retry_policy.as_ref()));
            repo.increment_retry(task.id).await.unwrap();
            repo.update_state(task.id, TaskStatus::Pending).await.unwrap();
        }
    }

    let final_task = repo.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(final_task.retry_count, 2);
    assert_eq!(final_task.status, TaskStatus::Failed);
    assert_eq!(observed_backoffs, vec![100, 300]);
}
