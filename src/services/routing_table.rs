//! Tool-to-model resolution (§4.5). Overrides take priority over defaults;
//! each tier matches exact first, then longest wildcard prefix.

use std::sync::Arc;

use anyhow::Result;

use crate::domain::models::{
    RouteDecision, RouteDefault, RouteOverride, RouteReason, RoutingTableEntry, FALLBACK_MODEL,
    FALLBACK_PROVIDER,
};
use crate::domain::ports::router_repository::RouterRepository;

pub struct RoutingTable {
    defaults: Vec<RouteDefault>,
    repo: Arc<dyn RouterRepository>,
}

impl RoutingTable {
    pub fn new(defaults: Vec<RouteDefault>, repo: Arc<dyn RouterRepository>) -> Self {
        Self { defaults, repo }
    }

    /// Resolution order: overrides (exact → prefix) → defaults (exact →
    /// prefix) → global fallback.
    pub async fn resolve(&self, tool_name: &str) -> Result<RouteDecision> {
        let overrides = self.repo.list_overrides().await?;
        if let Some(matched) = match_pattern(tool_name, &overrides, |o| &o.tool_pattern) {
            return Ok(RouteDecision {
                provider: matched.provider.clone(),
                model: matched.model.clone(),
                reason: RouteReason::Optimized,
            });
        }

        if let Some(matched) = match_pattern(tool_name, &self.defaults, |d| &d.tool_pattern) {
            return Ok(RouteDecision {
                provider: matched.provider.clone(),
                model: matched.model.clone(),
                reason: RouteReason::Default,
            });
        }

        Ok(RouteDecision {
            provider: FALLBACK_PROVIDER.to_string(),
            model: FALLBACK_MODEL.to_string(),
            reason: RouteReason::Fallback,
        })
    }

    /// Enumerates defaults with an `isOverride` flag reflecting presence in
    /// the override set.
    pub async fn get_all(&self) -> Result<Vec<RoutingTableEntry>> {
        let overrides = self.repo.list_overrides().await?;
        let entries = self
            .defaults
            .iter()
            .map(|d| {
                let is_override = overrides.iter().any(|o| o.tool_pattern == d.tool_pattern);
                let (provider, model) = if is_override {
                    let o = overrides.iter().find(|o| o.tool_pattern == d.tool_pattern).unwrap();
                    (o.provider.clone(), o.model.clone())
                } else {
                    (d.provider.clone(), d.model.clone())
                };
                RoutingTableEntry { tool_pattern: d.tool_pattern.clone(), provider, model, is_override }
            })
            .collect();
        Ok(entries)
    }

    pub async fn set_override(&self, override_: RouteOverride) -> Result<()> {
        self.repo.set_override(&override_).await?;
        Ok(())
    }

    pub async fn remove_override(&self, tool_pattern: &str) -> Result<()> {
        self.repo.remove_override(tool_pattern).await?;
        Ok(())
    }
}

/// Matches `tool_name` against `candidates` by exact match first, then by
/// the longest wildcard prefix (patterns ending in `*`), sorted
/// length-descending for deterministic longest-match semantics.
fn match_pattern<'a, T>(tool_name: &str, candidates: &'a [T], pattern_of: impl Fn(&T) -> &str) -> Option<&'a T> {
    if let Some(exact) = candidates.iter().find(|c| pattern_of(c) == tool_name) {
        return Some(exact);
    }

    let mut prefix_matches: Vec<&T> = candidates
        .iter()
        .filter(|c| {
            let pattern = pattern_of(c);
            pattern.ends_with('*') && tool_name.starts_with(&pattern[..pattern.len() - 1])
        })
        .collect();
    prefix_matches.sort_by_key(|c| std::cmp::Reverse(pattern_of(c).len()));
    prefix_matches.into_iter().next()
}
