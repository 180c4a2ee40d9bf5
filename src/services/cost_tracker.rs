//! Per-model pricing used to turn a tool call's token counts into the
//! `estimatedCost` persisted on each `CallMetric` (§3, §4.7).

/// Pricing per million tokens for a specific model.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    /// Cost per million input tokens (USD).
    pub input: f64,
    /// Cost per million output tokens (USD).
    pub output: f64,
}

/// Known model pricing table (costs in USD per million tokens). Matched by
/// substring so a dated model id like `claude-opus-4-1-20250805` still
/// resolves against the `opus` alias.
const PRICING_TABLE: &[(&str, ModelPricing)] = &[
    ("opus", ModelPricing { input: 15.0, output: 75.0 }),
    ("sonnet", ModelPricing { input: 3.0, output: 15.0 }),
    ("haiku", ModelPricing { input: 0.80, output: 4.0 }),
];

/// Get pricing for a model by name or alias.
pub fn get_model_pricing(model: &str) -> Option<ModelPricing> {
    let model_lower = model.to_lowercase();
    PRICING_TABLE.iter().find(|(name, _)| model_lower.contains(name)).map(|(_, pricing)| *pricing)
}

/// Estimate cost in USD for a call's input/output token counts. `None` for
/// an unrecognized model.
pub fn estimate_cost(model: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
    let pricing = get_model_pricing(model)?;
    Some((input_tokens as f64 * pricing.input + output_tokens as f64 * pricing.output) / 1_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_model_pricing_matches_dated_model_id() {
        let pricing = get_model_pricing("claude-opus-4-1-20250805").unwrap();
        assert_eq!(pricing.input, 15.0);
    }

    #[test]
    fn get_model_pricing_matches_haiku() {
        let pricing = get_model_pricing("claude-haiku-4-5-20250929").unwrap();
        assert_eq!(pricing.input, 0.80);
    }

    #[test]
    fn estimate_cost_input_and_output() {
        let cost = estimate_cost("claude-sonnet-4-5-20250929", 10_000, 5_000).unwrap();
        assert!((cost - (10_000.0 * 3.0 + 5_000.0 * 15.0) / 1_000_000.0).abs() < 1e-9);
    }

    #[test]
    fn estimate_cost_unknown_model_returns_none() {
        assert!(estimate_cost("gpt-5", 1_000, 1_000).is_none());
    }
}
