//! Autonomous router tuning (§4.7). Runs every `self_learner_interval_secs`
//! and executes three passes: upgrade unreliable routes, schedule downgrade
//! experiments on reliable ones, and evaluate experiments in flight.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{
    downgrade_anthropic_model, escalate_anthropic_model, DowngradeTest, DowngradeTestStatus,
    RouteOverride, RoutingOptimization, DOWNGRADE_CANDIDATE_MIN_CALLS,
    DOWNGRADE_CANDIDATE_MIN_SUCCESS_RATE, DOWNGRADE_TEST_INTERVAL, DOWNGRADE_TEST_SAMPLE_SIZE,
    MAX_DOWNGRADE_CANDIDATES_PER_CYCLE, MAX_PENDING_DOWNGRADE_TESTS, MIN_CALLS_FOR_OPTIMIZATION,
    SUCCESS_RATE_KEEP_THRESHOLD, SUCCESS_RATE_UPGRADE_THRESHOLD,
};
use crate::domain::ports::router_repository::RouterRepository;

pub struct SelfLearner {
    repo: Arc<dyn RouterRepository>,
    interval: Duration,
}

impl SelfLearner {
    pub fn new(repo: Arc<dyn RouterRepository>, interval: Duration) -> Self {
        Self { repo, interval }
    }

    /// Runs the three-pass cycle until `shutdown` fires.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_cycle().await {
                        warn!(error = %err, "self-learner cycle failed");
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

    pub async fn run_cycle(&self) -> Result<()> {
        self.upgrade_by_failure().await?;
        self.schedule_downgrade_tests().await?;
        self.evaluate_downgrade_tests().await?;
        Ok(())
    }

    async fn upgrade_by_failure(&self) -> Result<()> {
        let aggregated = self.repo.aggregate_metrics(None).await?;
        for row in aggregated {
            if row.total_calls < MIN_CALLS_FOR_OPTIMIZATION || row.success_rate >= SUCCESS_RATE_UPGRADE_THRESHOLD {
                continue;
            }
            let Some(new_model) = escalate_anthropic_model(&row.model) else {
                continue;
            };

            let reason = format!("success rate {:.1}%", row.success_rate * 100.0);
            self.repo
                .set_override(&RouteOverride {
                    tool_pattern: row.tool_name.clone(),
                    provider: row.provider.clone(),
                    model: new_model.to_string(),
                    reason: reason.clone(),
                    updated_at: Utc::now(),
                })
                .await?;
            self.repo
                .log_optimization(&RoutingOptimization {
                    id: Uuid::new_v4(),
                    tool_name: row.tool_name.clone(),
                    old_model: row.model.clone(),
                    new_model: new_model.to_string(),
                    reason,
                    created_at: Utc::now(),
                })
                .await?;
            info!(tool = %row.tool_name, from = %row.model, to = %new_model, "upgraded unreliable route");
        }
        Ok(())
    }

    async fn schedule_downgrade_tests(&self) -> Result<()> {
        let pending = self.repo.count_pending_downgrade_tests().await?;
        if pending >= MAX_PENDING_DOWNGRADE_TESTS {
            return Ok(());
        }

        let aggregated = self.repo.aggregate_metrics(None).await?;
        let mut scheduled = 0usize;
        for row in aggregated {
            if scheduled >= MAX_DOWNGRADE_CANDIDATES_PER_CYCLE || pending + scheduled >= MAX_PENDING_DOWNGRADE_TESTS {
                break;
            }
            if row.total_calls == 0 || row.total_calls % DOWNGRADE_TEST_INTERVAL != 0 {
                continue;
            }
            if row.success_rate < DOWNGRADE_CANDIDATE_MIN_SUCCESS_RATE || row.total_calls < DOWNGRADE_CANDIDATE_MIN_CALLS {
                continue;
            }
            let Some(cheaper_model) = downgrade_anthropic_model(&row.model) else {
                continue;
            };

            self.repo
                .insert_downgrade_test(&DowngradeTest {
                    id: Uuid::new_v4(),
                    tool_name: row.tool_name.clone(),
                    from_model: row.model.clone(),
                    to_model: cheaper_model.to_string(),
                    status: DowngradeTestStatus::Pending,
                    sample_size: 0,
                    success_count: 0,
                    created_at: Utc::now(),
                    completed_at: None,
                })
                .await?;
            scheduled += 1;
            info!(tool = %row.tool_name, from = %row.model, to = %cheaper_model, "scheduled downgrade test");
        }
        Ok(())
    }

    async fn evaluate_downgrade_tests(&self) -> Result<()> {
        let pending = self.repo.list_downgrade_tests(DowngradeTestStatus::Pending).await?;
        for test in pending {
            if test.sample_size < DOWNGRADE_TEST_SAMPLE_SIZE {
                continue;
            }
            let observed_rate = test.success_count as f64 / test.sample_size as f64;
            if observed_rate >= SUCCESS_RATE_KEEP_THRESHOLD {
                self.repo
                    .set_override(&RouteOverride {
                        tool_pattern: test.tool_name.clone(),
                        provider: "anthropic".to_string(),
                        model: test.to_model.clone(),
                        reason: format!("downgrade test passed at {:.1}%", observed_rate * 100.0),
                        updated_at: Utc::now(),
                    })
                    .await?;
                self.repo.complete_downgrade_test(test.id, DowngradeTestStatus::Passed).await?;
                info!(tool = %test.tool_name, model = %test.to_model, "downgrade test passed, installed cheaper model");
            } else {
                self.repo.complete_downgrade_test(test.id, DowngradeTestStatus::Failed).await?;
                info!(tool = %test.tool_name, rate = observed_rate, "downgrade test failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteRouterRepository};
    use crate::domain::models::CallMetric;

    async fn learner() -> (SelfLearner, Arc<dyn RouterRepository>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo: Arc<dyn RouterRepository> = Arc::new(SqliteRouterRepository::new(pool));
        (SelfLearner::new(repo.clone(), Duration::from_secs(60)), repo)
    }

    async fn record_calls(repo: &Arc<dyn RouterRepository>, tool: &str, provider: &str, model: &str, successes: u32, failures: u32) {
        for _ in 0..successes {
            repo.record_metric(&CallMetric {
                tool_name: tool.to_string(),
                provider: provider.to_string(),
                model: model.to_string(),
                success: true,
                latency_ms: 100,
                estimated_cost: 0.001,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        }
        for _ in 0..failures {
            repo.record_metric(&CallMetric {
                tool_name: tool.to_string(),
                provider: provider.to_string(),
                model: model.to_string(),
                success: false,
                latency_ms: 100,
                estimated_cost: 0.001,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn upgrade_by_failure_installs_override_below_threshold() {
        let (learner, repo) = learner().await;
        record_calls(&repo, "browser_click", "anthropic", "claude-haiku-4-5-20250929", 3, 7).await;

        learner.run_cycle().await.unwrap();

        let overrides = repo.list_overrides().await.unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].model, "claude-sonnet-4-5-20250929");
    }

    #[tokio::test]
    async fn upgrade_by_failure_skips_reliable_routes() {
        let (learner, repo) = learner().await;
        record_calls(&repo, "browser_click", "anthropic", "claude-haiku-4-5-20250929", 9, 1).await;

        learner.run_cycle().await.unwrap();

        assert!(repo.list_overrides().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn evaluate_downgrade_tests_installs_cheaper_model_on_pass() {
        let (learner, repo) = learner().await;
        let test = DowngradeTest {
            id: Uuid::new_v4(),
            tool_name: "browser_click".to_string(),
            from_model: "claude-sonnet-4-5-20250929".to_string(),
            to_model: "claude-haiku-4-5-20250929".to_string(),
            status: DowngradeTestStatus::Pending,
            sample_size: 0,
            success_count: 0,
            created_at: Utc::now(),
            completed_at: None,
        };
        repo.insert_downgrade_test(&test).await.unwrap();
        for i in 0..10 {
            repo.record_downgrade_test_result("browser_click", "claude-haiku-4-5-20250929", i < 9).await.unwrap();
        }

        learner.run_cycle().await.unwrap();

        let overrides = repo.list_overrides().await.unwrap();
        assert_eq!(overrides[0].model, "claude-haiku-4-5-20250929");
        let passed = repo.list_downgrade_tests(DowngradeTestStatus::Passed).await.unwrap();
        assert_eq!(passed.len(), 1);
    }

    #[tokio::test]
    async fn evaluate_downgrade_tests_marks_failed_below_keep_threshold() {
        let (learner, repo) = learner().await;
        let test = DowngradeTest {
            id: Uuid::new_v4(),
            tool_name: "browser_click".to_string(),
            from_model: "claude-sonnet-4-5-20250929".to_string(),
            to_model: "claude-haiku-4-5-20250929".to_string(),
            status: DowngradeTestStatus::Pending,
            sample_size: 0,
            success_count: 0,
            created_at: Utc::now(),
            completed_at: None,
        };
        repo.insert_downgrade_test(&test).await.unwrap();
        for i in 0..10 {
            repo.record_downgrade_test_result("browser_click", "claude-haiku-4-5-20250929", i < 5).await.unwrap();
        }

        learner.run_cycle().await.unwrap();

        let failed = repo.list_downgrade_tests(DowngradeTestStatus::Failed).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert!(repo.list_overrides().await.unwrap().is_empty());
    }
}
