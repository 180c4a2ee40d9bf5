//! Per-call metric recording and aggregation (§4.7).

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;

use crate::domain::models::{AggregatedMetric, CallMetric};
use crate::domain::ports::router_repository::RouterRepository;

pub struct RouterMetrics {
    repo: Arc<dyn RouterRepository>,
}

impl RouterMetrics {
    pub fn new(repo: Arc<dyn RouterRepository>) -> Self {
        Self { repo }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record_call(
        &self,
        tool_name: &str,
        provider: &str,
        model: &str,
        success: bool,
        latency_ms: u64,
        estimated_cost: f64,
    ) -> Result<()> {
        let metric = CallMetric {
            tool_name: tool_name.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            success,
            latency_ms,
            estimated_cost,
            timestamp: Utc::now(),
        };
        self.repo.record_metric(&metric).await?;
        Ok(())
    }

    /// Aggregated by (toolName, provider, model), ordered by `toolName
    /// ASC, successRate DESC`. `tool_name = None` aggregates across all
    /// tools.
    pub async fn aggregate(&self, tool_name: Option<&str>) -> Result<Vec<AggregatedMetric>> {
        Ok(self.repo.aggregate_metrics(tool_name).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteRouterRepository};

    async fn metrics() -> RouterMetrics {
        let pool = create_migrated_test_pool().await.unwrap();
        RouterMetrics::new(Arc::new(SqliteRouterRepository::new(pool)))
    }

    #[tokio::test]
    async fn record_call_then_aggregate_computes_success_rate() {
        let metrics = metrics().await;
        metrics
            .record_call("browser_click", "anthropic", "claude-haiku-4-5-20250929", true, 120, 0.001)
            .await
            .unwrap();
        metrics
            .record_call("browser_click", "anthropic", "claude-haiku-4-5-20250929", false, 200, 0.001)
            .await
            .unwrap();

        let aggregated = metrics.aggregate(Some("browser_click")).await.unwrap();
        assert_eq!(aggregated.len(), 1);
        let row = &aggregated[0];
        assert_eq!(row.total_calls, 2);
        assert_eq!(row.success_count, 1);
        assert!((row.success_rate - 0.5).abs() < f64::EPSILON);
    }
}
