//! Memory entry domain model, owned by the MemoryStore collaborator and
//! read/written by the Adaptive Memory Optimizer (§3, §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    ShortTerm,
    LongTerm,
    CrossSession,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShortTerm => "short_term",
            Self::LongTerm => "long_term",
            Self::CrossSession => "cross_session",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "short_term" => Some(Self::ShortTerm),
            "long_term" => Some(Self::LongTerm),
            "cross_session" => Some(Self::CrossSession),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub memory_type: MemoryType,
    pub session_id: String,
    pub content: String,
    pub role: String,
    pub metadata: serde_json::Value,
    pub relevance_score: f64,
    pub is_compressed: bool,
    pub compressed_at: Option<DateTime<Utc>>,
    pub compressed_token_count: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(session_id: impl Into<String>, role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            memory_type: MemoryType::ShortTerm,
            session_id: session_id.into(),
            content: content.into(),
            role: role.into(),
            metadata: serde_json::Value::Null,
            relevance_score: 0.5,
            is_compressed: false,
            compressed_at: None,
            compressed_token_count: None,
            created_at: Utc::now(),
        }
    }
}

/// The triplet of adaptive parameters the optimizer mutates and persists
/// each tick (§4.8, GLOSSARY "Adaptive parameters").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveParameters {
    pub compression_trigger: f64,
    pub full_message_window: u32,
    pub min_relevance: f64,
}

impl Default for AdaptiveParameters {
    fn default() -> Self {
        Self {
            compression_trigger: 0.70,
            full_message_window: 20,
            min_relevance: 0.30,
        }
    }
}

/// One optimizer-tick snapshot (§4.8 step 6), pruned to the newest
/// `maxHistoryEntries` (500).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationSnapshot {
    pub id: Uuid,
    pub tokens_before: u64,
    pub tokens_after: u64,
    pub compressed: u64,
    pub dropped: u64,
    pub promoted: u64,
    pub parameters: AdaptiveParameters,
    pub created_at: DateTime<Utc>,
}

pub const MAX_HISTORY_ENTRIES: usize = 500;

/// Action kind emitted by the `MemoryAnalyzer` contract (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryActionKind {
    Compress,
    Drop,
    Promote,
    Demote,
}

#[derive(Debug, Clone)]
pub struct MemoryAction {
    pub entry_id: Uuid,
    pub kind: MemoryActionKind,
}
