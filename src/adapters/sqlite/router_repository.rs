//! SQLite implementation of the RouterRepository (§4.5–§4.7).

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AggregatedMetric, CallMetric, DowngradeTest, DowngradeTestStatus, RouteOverride,
    RoutingOptimization,
};
use crate::domain::ports::router_repository::RouterRepository;

pub struct SqliteRouterRepository {
    pool: SqlitePool,
}

impl SqliteRouterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RouterRepository for SqliteRouterRepository {
    async fn set_override(&self, override_: &RouteOverride) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO routing_overrides (tool_pattern, provider, model, reason, updated_at)
             VALUES (?,?,?,?,?)
             ON CONFLICT(tool_pattern) DO UPDATE SET
                provider = excluded.provider, model = excluded.model,
                reason = excluded.reason, updated_at = excluded.updated_at",
        )
        .bind(&override_.tool_pattern)
        .bind(&override_.provider)
        .bind(&override_.model)
        .bind(&override_.reason)
        .bind(override_.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_override(&self, tool_pattern: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM routing_overrides WHERE tool_pattern = ?")
            .bind(tool_pattern)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_override(&self, tool_pattern: &str) -> DomainResult<Option<RouteOverride>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            tool_pattern: String,
            provider: String,
            model: String,
            reason: String,
            updated_at: String,
        }
        let row: Option<Row> = sqlx::query_as("SELECT * FROM routing_overrides WHERE tool_pattern = ?")
            .bind(tool_pattern)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            Ok(RouteOverride {
                tool_pattern: r.tool_pattern,
                provider: r.provider,
                model: r.model,
                reason: r.reason,
                updated_at: parse_datetime(&r.updated_at)?,
            })
        })
        .transpose()
    }

    async fn list_overrides(&self) -> DomainResult<Vec<RouteOverride>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            tool_pattern: String,
            provider: String,
            model: String,
            reason: String,
            updated_at: String,
        }
        let rows: Vec<Row> = sqlx::query_as("SELECT * FROM routing_overrides").fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|r| {
                Ok(RouteOverride {
                    tool_pattern: r.tool_pattern,
                    provider: r.provider,
                    model: r.model,
                    reason: r.reason,
                    updated_at: parse_datetime(&r.updated_at)?,
                })
            })
            .collect()
    }

    async fn record_metric(&self, metric: &CallMetric) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO router_metrics (id, tool_name, provider, model, success, latency_ms,
                estimated_cost, timestamp) VALUES (?,?,?,?,?,?,?,?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&metric.tool_name)
        .bind(&metric.provider)
        .bind(&metric.model)
        .bind(metric.success)
        .bind(metric.latency_ms as i64)
        .bind(metric.estimated_cost)
        .bind(metric.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn aggregate_metrics(&self, tool_name: Option<&str>) -> DomainResult<Vec<AggregatedMetric>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            tool_name: String,
            provider: String,
            model: String,
            total_calls: i64,
            success_count: i64,
            avg_latency_ms: f64,
            total_cost: f64,
            last_used: String,
        }
        let sql = "SELECT tool_name, provider, model,
                COUNT(*) as total_calls,
                SUM(success) as success_count,
                AVG(latency_ms) as avg_latency_ms,
                SUM(estimated_cost) as total_cost,
                MAX(timestamp) as last_used
             FROM router_metrics
             WHERE (?1 IS NULL OR tool_name = ?1)
             GROUP BY tool_name, provider, model";
        let rows: Vec<Row> = sqlx::query_as(sql).bind(tool_name).fetch_all(&self.pool).await?;

        let mut aggregates = rows
            .into_iter()
            .map(|r| {
                let success_rate = if r.total_calls > 0 {
                    r.success_count as f64 / r.total_calls as f64
                } else {
                    0.0
                };
                Ok(AggregatedMetric {
                    tool_name: r.tool_name,
                    provider: r.provider,
                    model: r.model,
                    total_calls: r.total_calls as u64,
                    success_count: r.success_count as u64,
                    failure_count: (r.total_calls - r.success_count) as u64,
                    success_rate,
                    avg_latency_ms: r.avg_latency_ms.round() as u64,
                    total_cost: r.total_cost,
                    last_used: parse_datetime(&r.last_used)?,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;

        aggregates.sort_by(|a, b| {
            a.tool_name
                .cmp(&b.tool_name)
                .then(b.success_rate.partial_cmp(&a.success_rate).unwrap_or(std::cmp::Ordering::Equal))
        });
        Ok(aggregates)
    }

    async fn log_optimization(&self, optimization: &RoutingOptimization) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO routing_optimizations (id, tool_name, old_model, new_model, reason, created_at)
             VALUES (?,?,?,?,?,?)",
        )
        .bind(optimization.id.to_string())
        .bind(&optimization.tool_name)
        .bind(&optimization.old_model)
        .bind(&optimization.new_model)
        .bind(&optimization.reason)
        .bind(optimization.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_downgrade_test(&self, test: &DowngradeTest) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO downgrade_tests (id, tool_name, from_model, to_model, status,
                sample_size, success_count, created_at, completed_at)
             VALUES (?,?,?,?,?,?,?,?,?)",
        )
        .bind(test.id.to_string())
        .bind(&test.tool_name)
        .bind(&test.from_model)
        .bind(&test.to_model)
        .bind(test.status.as_str())
        .bind(test.sample_size)
        .bind(test.success_count)
        .bind(test.created_at.to_rfc3339())
        .bind(test.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_pending_downgrade_tests(&self) -> DomainResult<usize> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM downgrade_tests WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as usize)
    }

    async fn list_downgrade_tests(&self, status: DowngradeTestStatus) -> DomainResult<Vec<DowngradeTest>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: String,
            tool_name: String,
            from_model: String,
            to_model: String,
            status: String,
            sample_size: i64,
            success_count: i64,
            created_at: String,
            completed_at: Option<String>,
        }
        let rows: Vec<Row> = sqlx::query_as("SELECT * FROM downgrade_tests WHERE status = ?")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| {
                Ok(DowngradeTest {
                    id: parse_uuid(&r.id)?,
                    tool_name: r.tool_name,
                    from_model: r.from_model,
                    to_model: r.to_model,
                    status: DowngradeTestStatus::from_str(&r.status).unwrap_or(DowngradeTestStatus::Pending),
                    sample_size: r.sample_size as u32,
                    success_count: r.success_count as u32,
                    created_at: parse_datetime(&r.created_at)?,
                    completed_at: parse_optional_datetime(r.completed_at)?,
                })
            })
            .collect()
    }

    async fn record_downgrade_test_result(
        &self,
        tool_name: &str,
        model: &str,
        success: bool,
    ) -> DomainResult<()> {
        sqlx::query(
            "UPDATE downgrade_tests SET
                sample_size = sample_size + 1,
                success_count = success_count + ?
             WHERE tool_name = ? AND to_model = ? AND status = 'pending'",
        )
        .bind(if success { 1 } else { 0 })
        .bind(tool_name)
        .bind(model)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_downgrade_test(&self, id: Uuid, status: DowngradeTestStatus) -> DomainResult<()> {
        sqlx::query("UPDATE downgrade_tests SET status = ?, completed_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn repo() -> SqliteRouterRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteRouterRepository::new(pool)
    }

    #[tokio::test]
    async fn set_override_then_get_all_round_trips() {
        let repo = repo().await;
        repo.set_override(&RouteOverride {
            tool_pattern: "browser_click".into(),
            provider: "anthropic".into(),
            model: "claude-sonnet-4-5-20250929".into(),
            reason: "success rate 40.0%".into(),
            updated_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

        let overrides = repo.list_overrides().await.unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].model, "claude-sonnet-4-5-20250929");
    }

    #[tokio::test]
    async fn aggregate_metrics_orders_by_tool_then_success_rate_desc() {
        let repo = repo().await;
        for (tool, success) in [("a", true), ("a", false), ("b", true)] {
            repo.record_metric(&CallMetric {
                tool_name: tool.into(),
                provider: "anthropic".into(),
                model: "haiku".into(),
                success,
                latency_ms: 10,
                estimated_cost: 0.01,
                timestamp: chrono::Utc::now(),
            })
            .await
            .unwrap();
        }
        let aggregated = repo.aggregate_metrics(None).await.unwrap();
        assert_eq!(aggregated.len(), 2);
        assert_eq!(aggregated[0].tool_name, "a");
        assert_eq!(aggregated[0].success_rate, 0.5);
    }
}
