//! Composition root: wires the Store adapters to the three subsystem
//! controllers and runs them as background workers until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;

use crate::adapters::sqlite::{
    initialize_database, SqliteMemoryRepository, SqliteRouterRepository, SqliteTaskRepository,
};
use crate::domain::models::{default_routes, Config};
use crate::domain::ports::{MemoryRepository, RouterRepository, TaskRepository};
use crate::services::{AdaptiveOptimizer, Executor, RoutingTable, Scheduler, SelfLearner};

/// Owns the database pool and the three subsystem controllers built on
/// top of it. Each controller runs as an independent `tokio` task,
/// coordinated by a shared shutdown channel.
pub struct RuntimeContext {
    pub task_repo: Arc<dyn TaskRepository>,
    pub router_repo: Arc<dyn RouterRepository>,
    pub memory_repo: Arc<dyn MemoryRepository>,
    pub scheduler: Arc<Scheduler>,
    pub routing_table: Arc<RoutingTable>,
    pub self_learner: SelfLearner,
    pub adaptive_optimizer: AdaptiveOptimizer,
    config: Config,
}

impl RuntimeContext {
    /// Opens the Store (creating the database file and running pending
    /// migrations if needed) and constructs every subsystem controller.
    pub async fn init(config: Config) -> Result<Self> {
        let database_url = format!("sqlite:{}", config.database.path);
        let pool = initialize_database(&database_url)
            .await
            .context("failed to initialize database")?;

        let task_repo: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let router_repo: Arc<dyn RouterRepository> = Arc::new(SqliteRouterRepository::new(pool.clone()));
        let memory_repo: Arc<dyn MemoryRepository> = Arc::new(SqliteMemoryRepository::new(pool));

        let executor = Arc::new(Executor::new(
            task_repo.clone(),
            Some(router_repo.clone()),
            config.task_queue.chat_endpoint_url.clone(),
            config.task_queue.webhook_timeout_ms,
        ));
        let scheduler = Arc::new(Scheduler::new(
            task_repo.clone(),
            executor,
            config.task_queue.max_concurrent,
            Duration::from_millis(config.task_queue.poll_interval_ms),
        ));

        let routing_table = Arc::new(RoutingTable::new(default_routes(), router_repo.clone()));
        let self_learner = SelfLearner::new(
            router_repo.clone(),
            Duration::from_secs(config.router.self_learner_interval_secs),
        );
        let adaptive_optimizer = AdaptiveOptimizer::new(memory_repo.clone(), config.optimizer.clone());

        Ok(Self {
            task_repo,
            router_repo,
            memory_repo,
            scheduler,
            routing_table,
            self_learner,
            adaptive_optimizer,
            config,
        })
    }

    /// Runs every subsystem worker until `ctrl_c` is received, then signals
    /// cooperative shutdown to each and waits for them to drain.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = self.scheduler.clone();
        let scheduler_rx = shutdown_rx.clone();
        let scheduler_handle = tokio::spawn(async move { scheduler.run(scheduler_rx).await });

        let self_learner = self.self_learner;
        let learner_rx = shutdown_rx.clone();
        let learner_handle = tokio::spawn(async move { self_learner.run(learner_rx).await });

        let adaptive_optimizer = self.adaptive_optimizer;
        let optimizer_rx = shutdown_rx.clone();
        let optimizer_handle = tokio::spawn(async move { adaptive_optimizer.run(optimizer_rx).await });

        info!(
            max_concurrent = self.config.task_queue.max_concurrent,
            self_learner_interval_secs = self.config.router.self_learner_interval_secs,
            optimizer_interval_ms = self.config.optimizer.interval_ms,
            "runtime started"
        );

        tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
        info!("shutdown signal received, draining workers");

        let _ = shutdown_tx.send(true);
        let _ = tokio::join!(scheduler_handle, learner_handle, optimizer_handle);

        Ok(())
    }
}
