//! AdaptiveOptimizer (§4.8): periodic controller that analyzes memory,
//! applies compress/drop/promote actions, and adapts its own thresholds
//! toward a target token-usage ratio.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{
    AdaptiveParameters, MemoryActionKind, MemoryEntry, MemoryType, OptimizationSnapshot,
    OptimizerConfig,
};
use crate::domain::ports::memory_repository::MemoryRepository;
use crate::services::budget_manager::BudgetManager;
use crate::services::memory_analyzer::MemoryAnalyzer;

const RECENT_SESSIONS: usize = 20;
const LEARNING_RATE: f64 = 0.05;
const TARGET_USAGE_RATIO: f64 = 0.65;

const COMPRESSION_TRIGGER_FLOOR: f64 = 0.40;
const COMPRESSION_TRIGGER_CEIL: f64 = 0.85;
const COMPRESSION_TRIGGER_STRONG_FLOOR: f64 = 0.35;
const FULL_MESSAGE_WINDOW_FLOOR: u32 = 10;
const FULL_MESSAGE_WINDOW_CEIL: u32 = 50;
const MIN_RELEVANCE_FLOOR: f64 = 0.15;
const MIN_RELEVANCE_CEIL: f64 = 0.60;
const MIN_RELEVANCE_STRONG_CEIL: f64 = 0.70;

const LOW_COMPRESSION_RATIO_THRESHOLD: f64 = 0.05;

pub struct AdaptiveOptimizer {
    repo: Arc<dyn MemoryRepository>,
    config: OptimizerConfig,
    budget: BudgetManager,
    analyzer: MemoryAnalyzer,
}

impl AdaptiveOptimizer {
    pub fn new(repo: Arc<dyn MemoryRepository>, config: OptimizerConfig) -> Self {
        let budget = BudgetManager::new(config.clone());
        Self { repo, config, budget, analyzer: MemoryAnalyzer::new() }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.interval_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.tick(None).await {
                        warn!(error = %err, "adaptive optimizer tick failed");
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

    /// Runs one controller tick, optionally scoped to a single session.
    /// Returns `None` when there were too few entries to act on.
    pub async fn tick(&self, session_id: Option<&str>) -> Result<Option<OptimizationSnapshot>> {
        let mut entries = self.target_entries(session_id).await?;
        if entries.len() < self.config.min_entries_for_optimization {
            return Ok(None);
        }

        let mut params = self.repo.get_adaptive_parameters().await?.unwrap_or_else(|| self.budget.defaults());

        let tokens_before: u64 = entries.iter().map(|e| self.budget.estimate_entry_tokens(&e.content)).sum();
        let available_budget = self.budget.available_budget();
        let usage_ratio = if available_budget == 0 { 0.0 } else { tokens_before as f64 / available_budget as f64 };

        let actions = self.analyzer.analyze(&entries, params.min_relevance);

        let mut compressed = 0u64;
        let mut dropped = 0u64;
        let mut promoted = 0u64;

        for action in &actions {
            let Some(entry) = entries.iter_mut().find(|e| e.id == action.entry_id) else {
                continue;
            };
            match action.kind {
                MemoryActionKind::Compress => {
                    if entry.is_compressed {
                        continue;
                    }
                    apply_compression(entry);
                    self.repo.update(entry).await?;
                    compressed += 1;
                }
                MemoryActionKind::Drop => {
                    self.repo.delete(entry.id).await?;
                    dropped += 1;
                }
                MemoryActionKind::Promote => {
                    entry.relevance_score = 1.0;
                    self.repo.update(entry).await?;
                    promoted += 1;
                }
                MemoryActionKind::Demote => {}
            }
        }

        entries.retain(|e| !actions.iter().any(|a| a.entry_id == e.id && a.kind == MemoryActionKind::Drop));
        let tokens_after: u64 = entries.iter().map(|e| self.budget.estimate_entry_tokens(&e.content)).sum();

        adapt_parameters(&mut params, usage_ratio, tokens_before, tokens_after);

        self.repo.set_adaptive_parameters(&params).await?;

        let snapshot = OptimizationSnapshot {
            id: Uuid::new_v4(),
            tokens_before,
            tokens_after,
            compressed,
            dropped,
            promoted,
            parameters: params,
            created_at: chrono::Utc::now(),
        };
        self.repo.append_snapshot(&snapshot).await?;
        self.repo.prune_snapshots(crate::domain::models::MAX_HISTORY_ENTRIES).await?;

        info!(
            tokens_before,
            tokens_after,
            compressed,
            dropped,
            promoted,
            usage_ratio,
            "adaptive optimizer tick complete"
        );

        Ok(Some(snapshot))
    }

    async fn target_entries(&self, session_id: Option<&str>) -> Result<Vec<MemoryEntry>> {
        match session_id {
            Some(id) => Ok(self.repo.list_by_session(id).await?),
            None => {
                let sessions = self.repo.recent_session_ids(RECENT_SESSIONS).await?;
                let mut entries = Vec::new();
                for session in sessions {
                    entries.extend(self.repo.list_by_session(&session).await?);
                }
                Ok(entries)
            }
        }
    }
}

fn apply_compression(entry: &mut MemoryEntry) {
    let preserved = extract_preserved_facts(&entry.content);
    let lines: Vec<&str> = entry.content.lines().collect();
    let first_line = lines.first().copied().unwrap_or_default();
    let last_line = lines.last().copied().unwrap_or_default();

    let summary = if preserved.is_empty() {
        format!("[{}] {} … {}", entry.role, first_line, last_line)
    } else {
        format!("[{}] {} … {} [preserved: {}]", entry.role, first_line, last_line, preserved.join(", "))
    };

    let compressed_tokens = (summary.len() as u64).div_ceil(4);
    entry.content = summary;
    entry.is_compressed = true;
    entry.compressed_at = Some(chrono::Utc::now());
    entry.compressed_token_count = Some(compressed_tokens);
}

/// Extracts URLs, emails, error lines, selector-like fragments, dotted-quad
/// IPs, and numbers with 3+ digits, preserved verbatim through compression.
fn extract_preserved_facts(content: &str) -> Vec<String> {
    let mut facts = Vec::new();
    for word in content.split_whitespace() {
        let trimmed = word.trim_matches(|c: char| c.is_ascii_punctuation() && c != '@' && c != '.');
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            facts.push(trimmed.to_string());
        } else if trimmed.contains('@') && trimmed.contains('.') {
            facts.push(trimmed.to_string());
        } else if is_dotted_quad(trimmed) {
            facts.push(trimmed.to_string());
        } else if (trimmed.starts_with('#') || trimmed.starts_with('.')) && trimmed.len() > 1 {
            facts.push(trimmed.to_string());
        } else if trimmed.chars().filter(|c| c.is_ascii_digit()).count() >= 3 {
            facts.push(trimmed.to_string());
        }
    }
    for line in content.lines() {
        if line.to_lowercase().contains("error") {
            facts.push(line.trim().to_string());
        }
    }
    facts.sort();
    facts.dedup();
    facts
}

fn is_dotted_quad(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 4 && parts.iter().all(|p| p.parse::<u8>().is_ok())
}

fn adapt_parameters(params: &mut AdaptiveParameters, usage_ratio: f64, tokens_before: u64, tokens_after: u64) {
    let delta = usage_ratio - TARGET_USAGE_RATIO;

    if delta > 0.10 {
        params.compression_trigger = (params.compression_trigger - LEARNING_RATE).max(COMPRESSION_TRIGGER_FLOOR);
        params.full_message_window = params.full_message_window.saturating_sub(2).max(FULL_MESSAGE_WINDOW_FLOOR);
        params.min_relevance = (params.min_relevance + LEARNING_RATE).min(MIN_RELEVANCE_CEIL);
    } else if delta < -0.15 {
        params.compression_trigger = (params.compression_trigger + 0.5 * LEARNING_RATE).min(COMPRESSION_TRIGGER_CEIL);
        params.full_message_window = (params.full_message_window + 1).min(FULL_MESSAGE_WINDOW_CEIL);
        params.min_relevance = (params.min_relevance - 0.5 * LEARNING_RATE).max(MIN_RELEVANCE_FLOOR);
    }

    let reduction_ratio = if tokens_before == 0 { 0.0 } else { (tokens_before - tokens_after.min(tokens_before)) as f64 / tokens_before as f64 };
    if reduction_ratio < LOW_COMPRESSION_RATIO_THRESHOLD && usage_ratio > TARGET_USAGE_RATIO {
        params.compression_trigger = (params.compression_trigger - 2.0 * LEARNING_RATE).max(COMPRESSION_TRIGGER_STRONG_FLOOR);
        params.min_relevance = (params.min_relevance + 2.0 * LEARNING_RATE).min(MIN_RELEVANCE_STRONG_CEIL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteMemoryRepository};

    async fn optimizer() -> AdaptiveOptimizer {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo: Arc<dyn MemoryRepository> = Arc::new(SqliteMemoryRepository::new(pool));
        AdaptiveOptimizer::new(repo, OptimizerConfig::default())
    }

    #[tokio::test]
    async fn tick_noops_below_min_entries() {
        let optimizer = optimizer().await;
        for i in 0..5 {
            let entry = MemoryEntry::new("session-1", "user", format!("message {i}"));
            optimizer.repo.store(&entry).await.unwrap();
        }
        let result = optimizer.tick(Some("session-1")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn tick_persists_snapshot_and_parameters() {
        let optimizer = optimizer().await;
        for i in 0..12 {
            let entry = MemoryEntry::new("session-1", "user", format!("a fairly ordinary chat message number {i}"));
            optimizer.repo.store(&entry).await.unwrap();
        }

        let snapshot = optimizer.tick(Some("session-1")).await.unwrap().unwrap();
        assert!(snapshot.tokens_before > 0);

        let params = optimizer.repo.get_adaptive_parameters().await.unwrap();
        assert!(params.is_some());

        let snapshots = optimizer.repo.list_snapshots(10).await.unwrap();
        assert_eq!(snapshots.len(), 1);
    }

    #[test]
    fn adapt_parameters_lowers_trigger_when_over_target() {
        let mut params = AdaptiveParameters::default();
        adapt_parameters(&mut params, 0.80, 1000, 950);
        assert!(params.compression_trigger < AdaptiveParameters::default().compression_trigger);
        assert!(params.min_relevance > AdaptiveParameters::default().min_relevance);
    }

    #[test]
    fn adapt_parameters_raises_trigger_when_under_target() {
        let mut params = AdaptiveParameters::default();
        adapt_parameters(&mut params, 0.40, 1000, 900);
        assert!(params.compression_trigger > AdaptiveParameters::default().compression_trigger);
        assert!(params.full_message_window > AdaptiveParameters::default().full_message_window);
    }

    #[test]
    fn adapt_parameters_applies_stronger_correction_on_low_reduction() {
        let mut params = AdaptiveParameters::default();
        adapt_parameters(&mut params, 0.90, 1000, 990);
        assert!(params.compression_trigger <= COMPRESSION_TRIGGER_FLOOR + 0.2);
    }
}
