//! Completion token budget for a single model call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::estimator::{TokenCounter, TokenEstimator};
use super::request::{ChatMessage, RequestConfig};
use crate::catalog::ModelCatalog;
use crate::error::Result;

/// Framing tokens added per message on top of the counted prompt.
pub const MESSAGE_FRAMING_OVERHEAD: u64 = 15;

/// Tokens held back from the context window on every call.
pub const SAFETY_MARGIN: u64 = 1_000;

/// `context_window - (prompt_tokens + 15 * message_count) - 1000`.
///
/// The result is negative when the prompt alone does not fit; it is never
/// raised to zero. Only values beyond the `i64` range are clamped.
pub fn max_completion_tokens(context_window: u64, prompt_tokens: u64, message_count: usize) -> i64 {
    let overhead = i128::from(MESSAGE_FRAMING_OVERHEAD) * message_count as i128;
    let budget = i128::from(context_window)
        - i128::from(prompt_tokens)
        - overhead
        - i128::from(SAFETY_MARGIN);
    budget.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Breakdown of one budget computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionBudget {
    pub model_id: String,
    pub context_window: u64,
    /// Tokens reported by the token counter
    pub prompt_tokens: u64,
    /// `MESSAGE_FRAMING_OVERHEAD` per message
    pub framing_overhead: u64,
    pub safety_margin: u64,
    /// May be zero or negative for oversized prompts
    pub max_completion_tokens: i64,
}

impl CompletionBudget {
    /// Whether the prompt leaves any room for a completion.
    pub fn is_positive(&self) -> bool {
        self.max_completion_tokens > 0
    }

    /// Prompt tokens including framing overhead.
    pub fn reserved_prompt_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.framing_overhead)
    }
}

/// Computes the completion bound for a request just before it is sent.
#[derive(Debug, Clone)]
pub struct TokenBudgetCalculator<C = TokenEstimator> {
    catalog: Arc<ModelCatalog>,
    counter: C,
}

impl TokenBudgetCalculator<TokenEstimator> {
    /// Calculator backed by the heuristic estimator.
    pub fn with_estimator(catalog: Arc<ModelCatalog>) -> Self {
        Self::new(catalog, TokenEstimator::default())
    }
}

impl<C: TokenCounter> TokenBudgetCalculator<C> {
    pub fn new(catalog: Arc<ModelCatalog>, counter: C) -> Self {
        Self { catalog, counter }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Compute the budget for `messages` sent to `model_id`.
    ///
    /// Fails with a configuration error for an unknown model before any
    /// tokens are counted.
    pub fn compute(&self, messages: &[ChatMessage], model_id: &str) -> Result<CompletionBudget> {
        let context_window = self.catalog.context_window(model_id)?;
        let prompt_tokens = self.counter.count_messages(messages, model_id);
        let framing_overhead = MESSAGE_FRAMING_OVERHEAD.saturating_mul(messages.len() as u64);
        let max_completion_tokens =
            max_completion_tokens(context_window, prompt_tokens, messages.len());

        let budget = CompletionBudget {
            model_id: model_id.to_string(),
            context_window,
            prompt_tokens,
            framing_overhead,
            safety_margin: SAFETY_MARGIN,
            max_completion_tokens,
        };

        if budget.is_positive() {
            debug!(
                model = model_id,
                prompt_tokens,
                framing_overhead,
                max_completion_tokens,
                "computed completion budget"
            );
        } else {
            warn!(
                model = model_id,
                context_window,
                prompt_tokens,
                framing_overhead,
                max_completion_tokens,
                "prompt leaves no room for a completion"
            );
        }

        Ok(budget)
    }

    /// Compute the budget and write it into the outbound request config.
    pub fn apply(
        &self,
        messages: &[ChatMessage],
        model_id: &str,
        config: &mut RequestConfig,
    ) -> Result<CompletionBudget> {
        let budget = self.compute(messages, model_id)?;
        config.max_completion_tokens = Some(budget.max_completion_tokens);
        Ok(budget)
    }
}
