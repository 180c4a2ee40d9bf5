//! Router repository port (§4.5–§4.7, §6: `routing_overrides`,
//! `router_metrics`, `routing_optimizations`, `downgrade_tests`).

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AggregatedMetric, CallMetric, DowngradeTest, DowngradeTestStatus, RouteOverride,
    RoutingOptimization,
};

#[async_trait]
pub trait RouterRepository: Send + Sync {
    /// Upsert an override (by `tool_pattern`), stamping `updated_at`.
    async fn set_override(&self, override_: &RouteOverride) -> DomainResult<()>;

    async fn remove_override(&self, tool_pattern: &str) -> DomainResult<()>;

    async fn get_override(&self, tool_pattern: &str) -> DomainResult<Option<RouteOverride>>;

    async fn list_overrides(&self) -> DomainResult<Vec<RouteOverride>>;

    async fn record_metric(&self, metric: &CallMetric) -> DomainResult<()>;

    /// Aggregated by (toolName, provider, model), ordered by
    /// `toolName ASC, successRate DESC`. `tool_name = None` aggregates
    /// across all tools.
    async fn aggregate_metrics(&self, tool_name: Option<&str>) -> DomainResult<Vec<AggregatedMetric>>;

    async fn log_optimization(&self, optimization: &RoutingOptimization) -> DomainResult<()>;

    async fn insert_downgrade_test(&self, test: &DowngradeTest) -> DomainResult<()>;

    async fn count_pending_downgrade_tests(&self) -> DomainResult<usize>;

    async fn list_downgrade_tests(&self, status: DowngradeTestStatus) -> DomainResult<Vec<DowngradeTest>>;

    /// Increment a pending test's sample/success counters for the
    /// matching (tool, model) row; called by the execution layer after
    /// every completed call (§9 Design Note: integration point is
    /// Executor, post-completion).
    async fn record_downgrade_test_result(
        &self,
        tool_name: &str,
        model: &str,
        success: bool,
    ) -> DomainResult<()>;

    async fn complete_downgrade_test(
        &self,
        id: uuid::Uuid,
        status: DowngradeTestStatus,
    ) -> DomainResult<()>;
}
