//! Error taxonomy shared by the budget, cost and log-parsing components.

use std::io;

use thiserror::Error;

/// Errors raised while budgeting, pricing or parsing usage logs.
///
/// Every variant is fatal to the unit of work that raised it; nothing is
/// retried and no partial record is produced.
#[derive(Error, Debug)]
pub enum UsageError {
    /// Unknown model id, or an invalid model catalog.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The log violates the send/receive/phase ordering protocol.
    #[error("Protocol violation at line {line}: {message}")]
    ProtocolViolation { line: usize, message: String },

    /// A required metric line is missing, unparsable or truncated.
    #[error("Malformed log at line {line}: {message}")]
    MalformedLog { line: usize, message: String },

    /// A CSV usage report does not match its schema.
    #[error("Invalid report at line {line}: {message}")]
    InvalidReport { line: usize, message: String },

    /// A model response does not carry the expected usage counters.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// IO error while reading a log or writing a report.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UsageError {
    pub(crate) fn unknown_model(model_id: &str) -> Self {
        Self::Configuration(format!("unknown model id '{}'", model_id))
    }

    pub(crate) fn protocol(line: usize, message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn malformed(line: usize, message: impl Into<String>) -> Self {
        Self::MalformedLog {
            line,
            message: message.into(),
        }
    }
}

/// Result type for usage accounting operations.
pub type Result<T> = std::result::Result<T, UsageError>;
