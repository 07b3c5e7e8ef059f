//! Completion token budgeting.
//!
//! Before a model call the calculator bounds the number of generated tokens
//! so that prompt, framing overhead, safety margin and completion together
//! stay inside the model's context window.
//!
//! # Overview
//!
//! - **TokenCounter**: the tokenizer capability (supplied by the caller)
//! - **TokenEstimator**: heuristic `TokenCounter` based on character/word counts
//! - **TokenBudgetCalculator**: looks up the context window and computes the bound
//! - **RequestConfig**: the outbound settings the bound is written into
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokenledger::budget::{ChatMessage, RequestConfig, TokenBudgetCalculator};
//! use tokenledger::catalog::ModelCatalog;
//!
//! let calculator = TokenBudgetCalculator::with_estimator(Arc::new(ModelCatalog::builtin()));
//! let mut config = RequestConfig::new();
//!
//! let budget = calculator.apply(&[ChatMessage::user("Write a game")], "gpt-4", &mut config)?;
//! assert_eq!(config.max_completion_tokens, Some(budget.max_completion_tokens));
//! ```

mod calculator;
mod estimator;
mod request;

pub use calculator::{
    max_completion_tokens, CompletionBudget, TokenBudgetCalculator, MESSAGE_FRAMING_OVERHEAD,
    SAFETY_MARGIN,
};
pub use estimator::{EstimationMethod, TokenCounter, TokenEstimator};
pub use request::{ChatMessage, RequestConfig};
