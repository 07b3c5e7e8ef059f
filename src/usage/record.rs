//! Usage and phase records recovered from run logs.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Timestamp layout used by the agent's log lines (`2025-21-05 14:03:11`).
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%d-%m %H:%M:%S";

/// Which usage-marker layout a log follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSchema {
    /// Only `Receive` markers, each followed by three metric lines
    #[default]
    CountOnly,
    /// Timestamped `Send`/`Receive` pairs
    Timestamped,
}

impl LogSchema {
    /// Column names of the tabular report for this schema.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            LogSchema::CountOnly => &[
                "role",
                "phase_name",
                "turn",
                "prompt_tokens",
                "completion_tokens",
                "total_tokens",
            ],
            LogSchema::Timestamped => &[
                "role",
                "phase_name",
                "turn",
                "prompt_tokens",
                "completion_tokens",
                "total_tokens",
                "send_time",
                "recv_time",
            ],
        }
    }
}

/// Token counts reported for one request/response exchange.
///
/// Timestamps are only present for the timestamped schema and are kept
/// verbatim as they appeared in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageInfo {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recv_time: Option<String>,
}

impl UsageInfo {
    /// Usage without exchange timestamps.
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
            send_time: None,
            recv_time: None,
        }
    }

    /// Usage with the send and receive timestamps of its exchange.
    pub fn timed(
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
        send_time: impl Into<String>,
        recv_time: impl Into<String>,
    ) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
            send_time: Some(send_time.into()),
            recv_time: Some(recv_time.into()),
        }
    }

    /// Time between send and receive, when both timestamps parse.
    pub fn latency(&self) -> Option<Duration> {
        let sent = parse_log_timestamp(self.send_time.as_deref()?)?;
        let received = parse_log_timestamp(self.recv_time.as_deref()?)?;
        Some(received - sent)
    }
}

/// Parse a log timestamp, trying the log layout first and ISO order second.
pub fn parse_log_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, LOG_TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

/// A phase marker decorated with the usage that completed before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseInfo {
    pub role: String,
    pub phase_name: String,
    pub turn: u64,
    pub usage_info: UsageInfo,
}

impl PhaseInfo {
    pub fn new(
        role: impl Into<String>,
        phase_name: impl Into<String>,
        turn: u64,
        usage_info: UsageInfo,
    ) -> Self {
        Self {
            role: role.into(),
            phase_name: phase_name.into(),
            turn,
            usage_info,
        }
    }
}
