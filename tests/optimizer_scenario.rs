//! End-to-end Adaptive Memory Optimizer scenario: a session running hot
//! (high token-usage ratio, no redundancy to exploit) should push the
//! compression trigger down by a strong correction and leave a snapshot
//! behind.

use std::sync::Arc;

use controlplane::adapters::sqlite::{create_migrated_test_pool, SqliteMemoryRepository};
use controlplane::domain::models::{MemoryEntry, OptimizerConfig};
use controlplane::domain::ports::memory_repository::MemoryRepository;
use controlplane::services::AdaptiveOptimizer;

/// Scenario 7: with `targetUsageRatio=0.65` and a session whose
/// `usageRatio` sits well above target while yielding no compress/drop
/// savings, one tick should drop `compressionTrigger` by at least
/// `2*lr=0.1` from its default (0.70), bounded by the strong floor
/// (0.35), and persist a snapshot.
#[tokio::test]
async fn adaptive_optimizer_applies_strong_correction_when_usage_is_hot_and_dry() {
    let pool = create_migrated_test_pool().await.unwrap();
    let repo: Arc<dyn MemoryRepository> = Arc::new(SqliteMemoryRepository::new(pool));

    let config = OptimizerConfig {
        interval_ms: 120_000,
        min_entries_for_optimization: 5,
        max_context_tokens: 200,
        system_prompt_tokens: 0,
        response_reserve_tokens: 0,
    };

    // Each entry is short enough to skip the redundancy check (<50 chars)
    // and unique enough to avoid tripping it regardless; fresh + default
    // relevance keeps every entry's score comfortably above `minRelevance`
    // so the analyzer emits zero compress/drop/promote actions.
    for i in 0..20 {
        let entry = MemoryEntry::new("session-hot", "user", format!("status update entry {i:03} nominal"));
        repo.store(&entry).await.unwrap();
    }

    let optimizer = AdaptiveOptimizer::new(repo.clone(), config);
    let snapshot = optimizer.tick(Some("session-hot")).await.unwrap().expect("20 entries clears the minimum");

    assert_eq!(snapshot.compressed, 0);
    assert_eq!(snapshot.dropped, 0);
    assert_eq!(snapshot.tokens_before, snapshot.tokens_after);
    assert!(snapshot.parameters.compression_trigger <= 0.60);
    assert!(snapshot.parameters.compression_trigger >= 0.35);

    let stored_params = repo.get_adaptive_parameters().await.unwrap().expect("parameters persisted");
    assert_eq!(stored_params, snapshot.parameters);
}
