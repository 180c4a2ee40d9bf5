//! Domain models
//!
//! Pure domain entities with business logic and validation rules.
//! These models are framework-agnostic and contain no infrastructure concerns.

pub mod config;
pub mod memory;
pub mod routing;
pub mod task;

pub use config::{Config, DatabaseConfig, LoggingConfig, OptimizerConfig, RouterConfig, TaskQueueConfig};
pub use memory::{
    AdaptiveParameters, MemoryAction, MemoryActionKind, MemoryEntry, MemoryType,
    OptimizationSnapshot, MAX_HISTORY_ENTRIES,
};
pub use routing::{
    default_routes, AggregatedMetric, CallMetric, DowngradeTest, DowngradeTestStatus,
    RouteDecision, RouteDefault, RouteOverride, RouteReason, RoutingOptimization,
    RoutingTableEntry,
};
pub use task::{
    Batch, RetryPolicy, Task, TaskPriority, TaskResult, TaskResultUpdate, TaskStats,
    TaskStatus, TaskStep, DEFAULT_TIMEOUT_MS,
};
