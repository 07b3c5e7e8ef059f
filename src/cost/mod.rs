//! Monetary cost of reported token usage.

use std::sync::Arc;

use tracing::debug;

use crate::catalog::ModelCatalog;
use crate::error::Result;
use crate::usage::ResponseUsage;

/// Cost for given token counts at per-1K prices.
pub fn calculate_cost(
    prompt_tokens: u64,
    completion_tokens: u64,
    prompt_price_per_1k: f64,
    completion_price_per_1k: f64,
) -> f64 {
    let prompt_cost = (prompt_tokens as f64 / 1000.0) * prompt_price_per_1k;
    let completion_cost = (completion_tokens as f64 / 1000.0) * completion_price_per_1k;
    prompt_cost + completion_cost
}

/// Prices reported usage against the model catalog.
#[derive(Debug, Clone)]
pub struct UsageCostEstimator {
    catalog: Arc<ModelCatalog>,
}

impl UsageCostEstimator {
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        Self { catalog }
    }

    /// Cost in USD of one exchange with `model_id`.
    pub fn cost(&self, model_id: &str, prompt_tokens: u64, completion_tokens: u64) -> Result<f64> {
        let (prompt_price, completion_price) = self.catalog.pricing(model_id)?;
        let cost = calculate_cost(prompt_tokens, completion_tokens, prompt_price, completion_price);
        debug!(
            model = model_id,
            prompt_tokens,
            completion_tokens,
            cost,
            "estimated usage cost"
        );
        Ok(cost)
    }

    /// Cost of a validated response.
    pub fn cost_for_response(&self, model_id: &str, usage: &ResponseUsage) -> Result<f64> {
        self.cost(model_id, usage.prompt_tokens, usage.completion_tokens)
    }
}

/// Format a cost the way the usage log prints it (`$0.001234`).
pub fn format_cost(cost: f64) -> String {
    format!("${:.6}", cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelEntry;
    use crate::error::UsageError;

    fn estimator() -> UsageCostEstimator {
        let catalog = ModelCatalog::from_entries([
            ModelEntry::new("gpt-4", 8_192, 0.03, 0.06),
            ModelEntry::new("local", 32_768, 0.0, 0.0),
        ])
        .unwrap();
        UsageCostEstimator::new(Arc::new(catalog))
    }

    #[test]
    fn test_cost_calculation() {
        let cost = estimator().cost("gpt-4", 1_000, 500).unwrap();
        // 1K prompt at $0.03 + 0.5K completion at $0.06
        assert!((cost - 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_zero_tokens_cost_nothing() {
        assert_eq!(estimator().cost("gpt-4", 0, 0).unwrap(), 0.0);
        assert_eq!(estimator().cost("local", 12_000, 3_000).unwrap(), 0.0);
    }

    #[test]
    fn test_unknown_model_is_configuration_error() {
        assert!(matches!(
            estimator().cost("gpt-5", 1_000, 500),
            Err(UsageError::Configuration(_))
        ));
    }

    #[test]
    fn test_cost_for_response() {
        let usage = ResponseUsage::new(2_000, 1_000, 3_000);
        let cost = estimator().cost_for_response("gpt-4", &usage).unwrap();
        assert!((cost - 0.12).abs() < 1e-12);
    }

    #[test]
    fn test_format_cost() {
        assert_eq!(format_cost(0.06), "$0.060000");
        assert_eq!(format_cost(0.1234567), "$0.123457");
    }
}
