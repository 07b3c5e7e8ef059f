//! Token usage recovered from multi-agent run logs.
//!
//! - **LogStreamParser**: correlates usage blocks with phase markers (FIFO)
//! - **ResponseUsage**: validated usage counters of a model response
//! - **UsageLogWriter**: renders usage blocks in the log format
//! - **UsageSummary**: per-phase and per-role aggregation
//! - **export**: CSV and JSON reports

pub mod export;
mod parser;
mod record;
mod response;
mod summary;
mod writer;

pub use parser::{LogStreamParser, ParseState, PhaseRecords};
pub use record::{parse_log_timestamp, LogSchema, PhaseInfo, UsageInfo, LOG_TIMESTAMP_FORMAT};
pub use response::ResponseUsage;
pub use summary::{LatencyStats, SummaryCost, UsageSummary, UsageTotals};
pub use writer::{log_timestamp, UsageLogWriter};
