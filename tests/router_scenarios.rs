//! End-to-end LLM Router scenarios: the SelfLearner's upgrade and
//! downgrade passes, driven entirely through the public repository port.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use controlplane::adapters::sqlite::{create_migrated_test_pool, SqliteRouterRepository};
use controlplane::domain::models::{CallMetric, DowngradeTestStatus};
use controlplane::domain::ports::router_repository::RouterRepository;
use controlplane::services::SelfLearner;

async fn router_repo() -> Arc<dyn RouterRepository> {
    let pool = create_migrated_test_pool().await.unwrap();
    Arc::new(SqliteRouterRepository::new(pool))
}

async fn record(repo: &Arc<dyn RouterRepository>, tool: &str, provider: &str, model: &str, success: bool) {
    repo.record_metric(&CallMetric {
        tool_name: tool.to_string(),
        provider: provider.to_string(),
        model: model.to_string(),
        success,
        latency_ms: 120,
        estimated_cost: 0.002,
        timestamp: Utc::now(),
    })
    .await
    .unwrap();
}

/// Scenario 5: 10 calls for `browser_click` on `haiku` with 4 successes
/// (40% success rate, below the 70% upgrade threshold) makes the
/// SelfLearner install a `sonnet` override, with the reason mentioning
/// the observed rate.
#[tokio::test]
async fn router_upgrade_on_sustained_failure() {
    let repo = router_repo().await;
    let learner = SelfLearner::new(repo.clone(), Duration::from_secs(60));

    for i in 0..10 {
        record(&repo, "browser_click", "anthropic", "claude-haiku-4-5-20250929", i < 4).await;
    }

    learner.run_cycle().await.unwrap();

    let overrides = repo.list_overrides().await.unwrap();
    assert_eq!(overrides.len(), 1);
    assert_eq!(overrides[0].tool_pattern, "browser_click");
    assert_eq!(overrides[0].model, "claude-sonnet-4-5-20250929");
    assert!(overrides[0].reason.contains("40.0%"));
}

/// Scenario 6: a route with a perfect success rate crossing the 500-call
/// boundary gets a pending downgrade test scheduled; feeding 10 test
/// results with 9 successes passes the test and installs the cheaper
/// model as an override.
#[tokio::test]
async fn router_downgrade_test_schedules_and_passes() {
    let repo = router_repo().await;
    let learner = SelfLearner::new(repo.clone(), Duration::from_secs(60));

    for _ in 0..500 {
        record(&repo, "browser_multi_act", "anthropic", "claude-opus-4-1-20250805", true).await;
    }

    learner.run_cycle().await.unwrap();

    let pending = repo.list_downgrade_tests(DowngradeTestStatus::Pending).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].tool_name, "browser_multi_act");
    assert_eq!(pending[0].to_model, "claude-sonnet-4-5-20250929");

    for i in 0..10 {
        repo.record_downgrade_test_result("browser_multi_act", "claude-sonnet-4-5-20250929", i < 9).await.unwrap();
    }

    learner.run_cycle().await.unwrap();

    let passed = repo.list_downgrade_tests(DowngradeTestStatus::Passed).await.unwrap();
    assert_eq!(passed.len(), 1);
    let overrides = repo.list_overrides().await.unwrap();
    assert!(overrides.iter().any(|o| o.tool_pattern == "browser_multi_act" && o.model == "claude-sonnet-4-5-20250929"));
}
