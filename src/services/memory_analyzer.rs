//! MemoryAnalyzer contract (§4.8): scores entry relevance and emits
//! compress/drop/promote/demote actions for the AdaptiveOptimizer to apply.

use std::collections::HashSet;

use chrono::Utc;

use crate::domain::models::{MemoryAction, MemoryActionKind, MemoryEntry, MemoryType};

const RECENCY_BONUS_1H: f64 = 0.2;
const RECENCY_BONUS_24H: f64 = 0.1;
const RECENCY_PENALTY_STALE: f64 = -0.1;
const REDUNDANCY_SIMILARITY_THRESHOLD: f64 = 0.9;
const REDUNDANCY_MIN_LEN: usize = 50;
const PROMOTE_MIN_SCORE: f64 = 0.8;

const KEY_FACT_PATTERNS: &[&str] = &["remember that", "important:", "note:", "key fact", "always", "never"];
const CONTENT_BONUS_PATTERNS: &[&str] = &["error", "http://", "https://", "@", "password", "token", "secret"];
const ACKNOWLEDGEMENT_PHRASES: &[&str] = &["ok", "okay", "got it", "sure", "thanks", "understood", "sounds good"];

pub struct MemoryAnalyzer;

impl MemoryAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Scores an entry's relevance in `[0, 1]` from its stored score plus
    /// recency, content, and role adjustments.
    pub fn score_relevance(&self, entry: &MemoryEntry) -> f64 {
        let mut score = entry.relevance_score;

        let age = Utc::now().signed_duration_since(entry.created_at);
        score += if age.num_hours() < 1 {
            RECENCY_BONUS_1H
        } else if age.num_hours() < 24 {
            RECENCY_BONUS_24H
        } else {
            RECENCY_PENALTY_STALE
        };

        let lower = entry.content.to_lowercase();
        if CONTENT_BONUS_PATTERNS.iter().any(|p| lower.contains(p)) {
            score += 0.15;
        }
        if is_selector_like(&entry.content) {
            score += 0.1;
        }

        if entry.role == "system" || entry.role == "tool" {
            score += 0.1;
        }

        let trimmed = entry.content.trim();
        if trimmed.len() < 10 {
            score -= 0.2;
        } else if ACKNOWLEDGEMENT_PHRASES.contains(&trimmed.to_lowercase().as_str()) {
            score -= 0.3;
        }

        score.clamp(0.0, 1.0)
    }

    /// Emits actions for a batch of entries belonging to the same
    /// analysis window. Order: relevance-driven compress/drop first,
    /// then redundancy-driven compress, then promotion.
    pub fn analyze(&self, entries: &[MemoryEntry], min_relevance: f64) -> Vec<MemoryAction> {
        let mut actions = Vec::new();
        let mut flagged: HashSet<uuid::Uuid> = HashSet::new();

        for entry in entries {
            let score = self.score_relevance(entry);
            if score < min_relevance {
                let kind = if entry.is_compressed { MemoryActionKind::Drop } else { MemoryActionKind::Compress };
                actions.push(MemoryAction { entry_id: entry.id, kind });
                flagged.insert(entry.id);
            }
        }

        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                let (a, b) = (&entries[i], &entries[j]);
                if a.content.len() < REDUNDANCY_MIN_LEN || b.content.len() < REDUNDANCY_MIN_LEN {
                    continue;
                }
                if jaccard_similarity(&a.content, &b.content) >= REDUNDANCY_SIMILARITY_THRESHOLD {
                    let older = if a.created_at <= b.created_at { a } else { b };
                    if flagged.insert(older.id) {
                        actions.push(MemoryAction { entry_id: older.id, kind: MemoryActionKind::Compress });
                    }
                }
            }
        }

        for entry in entries {
            if entry.memory_type != MemoryType::ShortTerm {
                continue;
            }
            let score = self.score_relevance(entry);
            let lower = entry.content.to_lowercase();
            if score >= PROMOTE_MIN_SCORE && KEY_FACT_PATTERNS.iter().any(|p| lower.contains(p)) {
                actions.push(MemoryAction { entry_id: entry.id, kind: MemoryActionKind::Promote });
            }
        }

        actions
    }
}

impl Default for MemoryAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_selector_like(content: &str) -> bool {
    content.contains('#') || content.contains('.') && content.chars().any(|c| c == '[' || c == ']')
}

fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    if words_a.is_empty() && words_b.is_empty() {
        return 0.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(content: &str, created_at: chrono::DateTime<Utc>, relevance_score: f64) -> MemoryEntry {
        MemoryEntry {
            relevance_score,
            created_at,
            ..MemoryEntry::new("session-1", "user", content)
        }
    }

    #[test]
    fn recent_entry_gets_recency_bonus() {
        let analyzer = MemoryAnalyzer::new();
        let recent = entry("a meaningful message about the task", Utc::now(), 0.5);
        let stale = entry("a meaningful message about the task", Utc::now() - Duration::hours(48), 0.5);
        assert!(analyzer.score_relevance(&recent) > analyzer.score_relevance(&stale));
    }

    #[test]
    fn short_acknowledgement_is_penalized() {
        let analyzer = MemoryAnalyzer::new();
        let ack = entry("ok", Utc::now(), 0.5);
        assert!(analyzer.score_relevance(&ack) < 0.5);
    }

    #[test]
    fn low_relevance_entry_emits_compress_then_drop() {
        let analyzer = MemoryAnalyzer::new();
        let mut stale = entry("ok", Utc::now() - Duration::hours(48), 0.0);
        let actions = analyzer.analyze(std::slice::from_ref(&stale), 0.3);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, MemoryActionKind::Compress);

        stale.is_compressed = true;
        let actions = analyzer.analyze(std::slice::from_ref(&stale), 0.3);
        assert_eq!(actions[0].kind, MemoryActionKind::Drop);
    }

    #[test]
    fn redundant_entries_compress_the_older_one() {
        let analyzer = MemoryAnalyzer::new();
        let text = "the quick brown fox jumps over the lazy dog near the riverbank every single morning";
        let older = entry(text, Utc::now() - Duration::hours(2), 0.5);
        let newer = entry(text, Utc::now(), 0.5);
        let actions = analyzer.analyze(&[older.clone(), newer], 0.0);
        assert!(actions.iter().any(|a| a.entry_id == older.id && a.kind == MemoryActionKind::Compress));
    }

    #[test]
    fn short_term_key_fact_above_threshold_is_promoted() {
        let analyzer = MemoryAnalyzer::new();
        let mut fact = entry("important: the deploy key is rotated weekly", Utc::now(), 0.9);
        fact.memory_type = MemoryType::ShortTerm;
        let actions = analyzer.analyze(std::slice::from_ref(&fact), 0.0);
        assert!(actions.iter().any(|a| a.kind == MemoryActionKind::Promote));
    }
}
