//! TokenBudgetManager collaborator (§4.8): computes the available token
//! budget and usage ratio the AdaptiveOptimizer adapts against.

use crate::domain::models::{AdaptiveParameters, OptimizerConfig};
use crate::services::context_truncation::estimate_tokens;

pub struct BudgetManager {
    config: OptimizerConfig,
}

impl BudgetManager {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// `maxContextTokens − systemPromptTokens − responseReserveTokens`.
    pub fn available_budget(&self) -> u64 {
        self.config
            .max_context_tokens
            .saturating_sub(self.config.system_prompt_tokens)
            .saturating_sub(self.config.response_reserve_tokens)
    }

    pub fn estimate_entry_tokens(&self, content: &str) -> u64 {
        estimate_tokens(content) as u64
    }

    pub fn usage_ratio(&self, tokens: u64) -> f64 {
        let budget = self.available_budget();
        if budget == 0 {
            return 0.0;
        }
        tokens as f64 / budget as f64
    }

    pub fn defaults(&self) -> AdaptiveParameters {
        AdaptiveParameters::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_budget_subtracts_reserves() {
        let manager = BudgetManager::new(OptimizerConfig {
            max_context_tokens: 200_000,
            system_prompt_tokens: 2_000,
            response_reserve_tokens: 4_000,
            ..OptimizerConfig::default()
        });
        assert_eq!(manager.available_budget(), 194_000);
    }

    #[test]
    fn usage_ratio_divides_by_available_budget() {
        let manager = BudgetManager::new(OptimizerConfig {
            max_context_tokens: 1_000,
            system_prompt_tokens: 0,
            response_reserve_tokens: 0,
            ..OptimizerConfig::default()
        });
        assert!((manager.usage_ratio(650) - 0.65).abs() < 1e-9);
    }
}
