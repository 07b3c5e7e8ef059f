//! Token accounting for LLM-driven multi-agent runs.
//!
//! - [`budget`]: bounds `max_completion_tokens` before each model call
//! - [`cost`]: prices the usage reported after each call
//! - [`usage`]: recovers per-phase usage from run logs
//! - [`catalog`]: the shared model table both lookups read from

pub mod budget;
pub mod catalog;
pub mod cost;
pub mod error;
pub mod usage;

pub use error::{Result, UsageError};
