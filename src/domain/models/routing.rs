//! LLM routing domain model (§3 Routing, §4.5–§4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A default route entry: `toolPattern → (category, defaultProvider,
/// defaultModel, fallbacks[])`. Patterns are exact or prefix-with-`*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDefault {
    pub tool_pattern: String,
    pub category: String,
    pub provider: String,
    pub model: String,
    pub fallbacks: Vec<String>,
}

/// The production default route table: browser primitives named in
/// `§4.5`/`§8` scenarios, mapped to a cheap model with a handful of
/// categories escalated to the stronger default where the action is
/// harder to recover from (closing a tab, multi-step interaction).
pub fn default_routes() -> Vec<RouteDefault> {
    vec![
        RouteDefault {
            tool_pattern: "browser_tab_*".to_string(),
            category: "navigation".to_string(),
            provider: "anthropic".to_string(),
            model: "claude-haiku-4-5-20250929".to_string(),
            fallbacks: vec!["claude-sonnet-4-5-20250929".to_string()],
        },
        RouteDefault {
            tool_pattern: "browser_tab_close".to_string(),
            category: "navigation".to_string(),
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            fallbacks: vec![],
        },
        RouteDefault {
            tool_pattern: "browser_click".to_string(),
            category: "interaction".to_string(),
            provider: "anthropic".to_string(),
            model: "claude-haiku-4-5-20250929".to_string(),
            fallbacks: vec!["claude-sonnet-4-5-20250929".to_string()],
        },
        RouteDefault {
            tool_pattern: "browser_type".to_string(),
            category: "interaction".to_string(),
            provider: "anthropic".to_string(),
            model: "claude-haiku-4-5-20250929".to_string(),
            fallbacks: vec!["claude-sonnet-4-5-20250929".to_string()],
        },
        RouteDefault {
            tool_pattern: "browser_multi_act".to_string(),
            category: "interaction".to_string(),
            provider: "anthropic".to_string(),
            model: "claude-opus-4-5-20250929".to_string(),
            fallbacks: vec!["claude-sonnet-4-5-20250929".to_string()],
        },
        RouteDefault {
            tool_pattern: "browser_extract_*".to_string(),
            category: "extraction".to_string(),
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            fallbacks: vec![],
        },
        RouteDefault {
            tool_pattern: "browser_*".to_string(),
            category: "general".to_string(),
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            fallbacks: vec![],
        },
    ]
}

/// A persisted override: `toolPattern → (provider, model, reason,
/// updatedAt)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteOverride {
    pub tool_pattern: String,
    pub provider: String,
    pub model: String,
    pub reason: String,
    pub updated_at: DateTime<Utc>,
}

/// The reason a route decision was produced (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    Default,
    Optimized,
    Fallback,
    DowngradeTest,
    NoAvailableProvider,
}

impl RouteReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Optimized => "optimized",
            Self::Fallback => "fallback",
            Self::DowngradeTest => "downgrade_test",
            Self::NoAvailableProvider => "no_available_provider",
        }
    }
}

/// A route decision: a (provider, model, reason) triple (GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    pub provider: String,
    pub model: String,
    pub reason: RouteReason,
}

/// A full routing table entry as returned by `getAll()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingTableEntry {
    pub tool_pattern: String,
    pub provider: String,
    pub model: String,
    pub is_override: bool,
}

/// Per-call metric row (§3 Metric). Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMetric {
    pub tool_name: String,
    pub provider: String,
    pub model: String,
    pub success: bool,
    pub latency_ms: u64,
    pub estimated_cost: f64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregated metrics grouped by (toolName, provider, model) (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedMetric {
    pub tool_name: String,
    pub provider: String,
    pub model: String,
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: f64,
    pub avg_latency_ms: u64,
    pub total_cost: f64,
    pub last_used: DateTime<Utc>,
}

/// A logged routing optimization event (upgrade or downgrade install).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingOptimization {
    pub id: uuid::Uuid,
    pub tool_name: String,
    pub old_model: String,
    pub new_model: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DowngradeTestStatus {
    Pending,
    Passed,
    Failed,
}

impl DowngradeTestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A bounded-sample downgrade experiment (§4.7 pass 2/3, GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DowngradeTest {
    pub id: uuid::Uuid,
    pub tool_name: String,
    pub from_model: String,
    pub to_model: String,
    pub status: DowngradeTestStatus,
    pub sample_size: u32,
    pub success_count: u32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Monotonic upgrade ladder for Anthropic models (§4.7 pass 1).
pub fn escalate_anthropic_model(model: &str) -> Option<&'static str> {
    match model {
        m if m.contains("haiku") => Some("claude-sonnet-4-5-20250929"),
        m if m.contains("sonnet") => Some("claude-opus-4-1-20250805"),
        _ => None,
    }
}

/// Cheaper-model step for downgrade proposals (§4.7 pass 2).
pub fn downgrade_anthropic_model(model: &str) -> Option<&'static str> {
    match model {
        m if m.contains("opus") => Some("claude-sonnet-4-5-20250929"),
        m if m.contains("sonnet") => Some("claude-haiku-4-5-20250929"),
        _ => None,
    }
}

pub const FALLBACK_PROVIDER: &str = "anthropic";
pub const FALLBACK_MODEL: &str = "claude-sonnet-4-5-20250929";

pub const MIN_CALLS_FOR_OPTIMIZATION: u64 = 10;
pub const SUCCESS_RATE_UPGRADE_THRESHOLD: f64 = 0.7;
pub const DOWNGRADE_TEST_INTERVAL: u64 = 500;
pub const DOWNGRADE_TEST_SAMPLE_SIZE: u32 = 10;
pub const SUCCESS_RATE_KEEP_THRESHOLD: f64 = 0.9;
pub const DOWNGRADE_CANDIDATE_MIN_SUCCESS_RATE: f64 = 0.95;
pub const DOWNGRADE_CANDIDATE_MIN_CALLS: u64 = 20;
pub const MAX_PENDING_DOWNGRADE_TESTS: usize = 4;
pub const MAX_DOWNGRADE_CANDIDATES_PER_CYCLE: usize = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalate_stops_at_opus() {
        assert_eq!(
            escalate_anthropic_model("claude-haiku-4-5-20250929"),
            Some("claude-sonnet-4-5-20250929")
        );
        assert_eq!(
            escalate_anthropic_model("claude-sonnet-4-5-20250929"),
            Some("claude-opus-4-1-20250805")
        );
        assert_eq!(escalate_anthropic_model("claude-opus-4-1-20250805"), None);
    }

    #[test]
    fn downgrade_steps_down_the_ladder() {
        assert_eq!(
            downgrade_anthropic_model("claude-opus-4-1-20250805"),
            Some("claude-sonnet-4-5-20250929")
        );
        assert_eq!(
            downgrade_anthropic_model("claude-sonnet-4-5-20250929"),
            Some("claude-haiku-4-5-20250929")
        );
    }
}
