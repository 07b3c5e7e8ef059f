//! Usage counters extracted from a model-call response body.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::record::UsageInfo;
use crate::error::{Result, UsageError};

/// Usage counters every model response must carry.
///
/// Built only through [`ResponseUsage::from_json`] / [`ResponseUsage::from_value`]
/// (or [`ResponseUsage::new`] for known-good values); a response without
/// valid counters is an error, never a zero default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl ResponseUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// Validate a raw response body of the form `{"usage": {...}, ...}`.
    pub fn from_json(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body).map_err(|e| {
            UsageError::MalformedResponse(format!("response is not valid JSON: {}", e))
        })?;
        Self::from_value(&value)
    }

    /// Validate an already decoded response.
    pub fn from_value(response: &Value) -> Result<Self> {
        let usage = match response.get("usage") {
            Some(usage @ Value::Object(_)) => usage,
            Some(other) => {
                return Err(UsageError::MalformedResponse(format!(
                    "'usage' is not an object: {}",
                    other
                )))
            }
            None => {
                return Err(UsageError::MalformedResponse(
                    "response has no 'usage' object".to_string(),
                ))
            }
        };

        let parsed = Self {
            prompt_tokens: counter(usage, "prompt_tokens")?,
            completion_tokens: counter(usage, "completion_tokens")?,
            total_tokens: counter(usage, "total_tokens")?,
        };

        if parsed
            .prompt_tokens
            .checked_add(parsed.completion_tokens)
            .map_or(true, |sum| sum != parsed.total_tokens)
        {
            warn!(
                prompt_tokens = parsed.prompt_tokens,
                completion_tokens = parsed.completion_tokens,
                total_tokens = parsed.total_tokens,
                "response total_tokens differs from prompt + completion"
            );
        }

        Ok(parsed)
    }
}

fn counter(usage: &Value, name: &str) -> Result<u64> {
    let value = usage
        .get(name)
        .ok_or_else(|| UsageError::MalformedResponse(format!("usage is missing '{}'", name)))?;
    value.as_u64().ok_or_else(|| {
        UsageError::MalformedResponse(format!(
            "'{}' is not a non-negative integer: {}",
            name, value
        ))
    })
}

impl From<ResponseUsage> for UsageInfo {
    fn from(usage: ResponseUsage) -> Self {
        UsageInfo::new(
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.total_tokens,
        )
    }
}
