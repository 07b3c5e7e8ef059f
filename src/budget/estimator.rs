//! Token counting for outbound prompts.
//!
//! The exact tokenizer is a capability of the model provider, so the budget
//! calculator only depends on the [`TokenCounter`] trait. [`TokenEstimator`]
//! is a heuristic implementation based on character and word counts.

use serde::{Deserialize, Serialize};

use super::request::ChatMessage;

/// Counts prompt tokens for a model.
pub trait TokenCounter {
    /// Count the tokens of a serialized conversation for `model_id`.
    fn count_messages(&self, messages: &[ChatMessage], model_id: &str) -> u64;
}

impl<T: TokenCounter + ?Sized> TokenCounter for &T {
    fn count_messages(&self, messages: &[ChatMessage], model_id: &str) -> u64 {
        (**self).count_messages(messages, model_id)
    }
}

/// Token estimation strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimationMethod {
    /// Simple character-based estimation (4 chars ≈ 1 token for English)
    CharacterBased,
    /// Word-based estimation (1 word ≈ 1.3 tokens)
    WordBased,
    /// Higher of the two, with a safety margin
    #[default]
    Conservative,
}

/// Heuristic token counter.
#[derive(Debug, Clone)]
pub struct TokenEstimator {
    method: EstimationMethod,
    /// Multiplier for conservative estimation
    safety_margin: f64,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            method: EstimationMethod::Conservative,
            safety_margin: 1.2,
        }
    }
}

impl TokenEstimator {
    /// Create a new token estimator with the specified method.
    pub fn new(method: EstimationMethod) -> Self {
        let safety_margin = match method {
            EstimationMethod::CharacterBased | EstimationMethod::WordBased => 1.0,
            EstimationMethod::Conservative => 1.2,
        };
        Self {
            method,
            safety_margin,
        }
    }

    /// Create a conservative estimator with custom safety margin.
    pub fn conservative(safety_margin: f64) -> Self {
        Self {
            method: EstimationMethod::Conservative,
            safety_margin: safety_margin.max(1.0),
        }
    }

    pub fn method(&self) -> EstimationMethod {
        self.method
    }

    /// Estimate tokens from text.
    pub fn estimate(&self, text: &str) -> u64 {
        let base_estimate = match self.method {
            EstimationMethod::CharacterBased => self.estimate_by_chars(text),
            EstimationMethod::WordBased => self.estimate_by_words(text),
            EstimationMethod::Conservative => {
                let char_estimate = self.estimate_by_chars(text);
                let word_estimate = self.estimate_by_words(text);
                char_estimate.max(word_estimate)
            }
        };

        (base_estimate as f64 * self.safety_margin).ceil() as u64
    }

    /// Roughly 3.5 characters per token.
    fn estimate_by_chars(&self, text: &str) -> u64 {
        let chars = text.chars().count();
        (chars as f64 / 3.5).ceil() as u64
    }

    /// Roughly 1.3 tokens per word.
    fn estimate_by_words(&self, text: &str) -> u64 {
        let words = text.split_whitespace().count();
        (words as f64 * 1.3).ceil() as u64
    }
}

impl TokenCounter for TokenEstimator {
    fn count_messages(&self, messages: &[ChatMessage], _model_id: &str) -> u64 {
        messages
            .iter()
            .map(|message| self.estimate(&message.role) + self.estimate(&message.content))
            .sum()
    }
}
