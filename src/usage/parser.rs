//! Single-pass parser turning run-log lines into phase-correlated usage.
//!
//! The agent logs a usage block around every model call and a phase marker
//! whenever a role takes a turn in a phase:
//!
//! ```text
//! [2025-21-05 14:03:11 INFO] **[OpenAI_Usage_Info Send]**
//! model: gpt-4o-mini
//! [2025-21-05 14:03:29 INFO] **[OpenAI_Usage_Info Receive]**
//! prompt_tokens: 1203
//! completion_tokens: 412
//! total_tokens: 1615
//! cost: $0.000428
//! [2025-21-05 14:03:29 INFO] Chief Executive Officer: **Chief Product Officer<->Chief Executive Officer on : DemandAnalysis, turn 0**
//! ```
//!
//! Completed usage records are queued and the i-th phase marker claims the
//! i-th completed record. Any violation of that protocol aborts the parse.

use std::collections::VecDeque;
use std::io::BufRead;
use std::iter::FusedIterator;
use std::mem;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::{debug, trace};

use super::record::{LogSchema, PhaseInfo, UsageInfo};
use crate::error::{Result, UsageError};

pub(crate) const SEND_MARKER: &str = "**[OpenAI_Usage_Info Send]**";
pub(crate) const RECEIVE_MARKER: &str = "**[OpenAI_Usage_Info Receive]**";

fn phase_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"INFO\] (.*?): \*\*.*?on : (.*?), turn (\d+)\*\*")
            .expect("phase marker pattern is valid")
    })
}

fn send_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\[(.+?) INFO\] \*\*\[OpenAI_Usage_Info Send\]\*\*")
            .expect("send marker pattern is valid")
    })
}

fn receive_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\[(.+?) INFO\] \*\*\[OpenAI_Usage_Info Receive\]\*\*")
            .expect("receive marker pattern is valid")
    })
}

fn metric_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*([^:]+?): (\d+)\s*$").expect("metric line pattern is valid")
    })
}

/// Where the parser is inside the current usage block.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParserState {
    Idle,
    /// Timestamped schema only: a send marker is waiting for its receive.
    AwaitingReceive { send_time: String },
    CollectingMetrics(PendingUsage),
}

/// A usage record whose metric lines are still being read.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingUsage {
    exchange: Option<Exchange>,
    progress: MetricProgress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Exchange {
    send_time: String,
    recv_time: String,
}

/// Next metric line expected, carrying the values already read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricProgress {
    Prompt,
    Completion { prompt_tokens: u64 },
    Total { prompt_tokens: u64, completion_tokens: u64 },
}

impl MetricProgress {
    fn label(&self) -> &'static str {
        match self {
            MetricProgress::Prompt => "prompt_tokens",
            MetricProgress::Completion { .. } => "completion_tokens",
            MetricProgress::Total { .. } => "total_tokens",
        }
    }

    fn remaining(&self) -> usize {
        match self {
            MetricProgress::Prompt => 3,
            MetricProgress::Completion { .. } => 2,
            MetricProgress::Total { .. } => 1,
        }
    }
}

/// Accumulator and pending-usage queue for one parse.
///
/// Feed lines in log order with [`ParseState::feed`] and call
/// [`ParseState::finish`] once the input is exhausted.
#[derive(Debug, Clone)]
pub struct ParseState {
    schema: LogSchema,
    state: ParserState,
    pending: VecDeque<UsageInfo>,
    line_no: usize,
}

impl ParseState {
    pub fn new(schema: LogSchema) -> Self {
        Self {
            schema,
            state: ParserState::Idle,
            pending: VecDeque::new(),
            line_no: 0,
        }
    }

    /// Number of lines fed so far.
    pub fn line_number(&self) -> usize {
        self.line_no
    }

    /// Completed usage records not yet claimed by a phase marker.
    pub fn pending_usage(&self) -> usize {
        self.pending.len()
    }

    /// Whether no usage block is partially read.
    pub fn is_idle(&self) -> bool {
        self.state == ParserState::Idle
    }

    /// Process one line, returning a phase record if the line was a phase marker.
    pub fn feed(&mut self, line: &str) -> Result<Option<PhaseInfo>> {
        self.line_no += 1;
        let line = line.trim_end_matches(['\r', '\n']);

        match mem::replace(&mut self.state, ParserState::Idle) {
            ParserState::CollectingMetrics(pending) => {
                self.collect_metric(pending, line)?;
                Ok(None)
            }
            state => {
                self.state = state;
                self.scan(line)
            }
        }
    }

    /// Check that the input did not end inside a usage exchange.
    ///
    /// Usage records never claimed by a phase marker are dropped.
    pub fn finish(self) -> Result<()> {
        let ParseState {
            state,
            pending,
            line_no,
            ..
        } = self;

        match state {
            ParserState::Idle => {}
            ParserState::AwaitingReceive { send_time } => {
                return Err(UsageError::malformed(
                    line_no,
                    format!(
                        "log ended before the receive marker of the exchange sent at {}",
                        send_time
                    ),
                ));
            }
            ParserState::CollectingMetrics(pending) => {
                return Err(UsageError::malformed(
                    line_no,
                    format!(
                        "log ended inside a usage block: {} metric line(s) missing, next '{}'",
                        pending.progress.remaining(),
                        pending.progress.label()
                    ),
                ));
            }
        }

        if !pending.is_empty() {
            debug!(
                unclaimed = pending.len(),
                "usage records without a following phase marker were dropped"
            );
        }
        Ok(())
    }

    fn scan(&mut self, line: &str) -> Result<Option<PhaseInfo>> {
        if let Some(caps) = phase_marker().captures(line) {
            return self.claim_usage(&caps).map(Some);
        }

        match self.schema {
            LogSchema::CountOnly => {
                if line.contains(RECEIVE_MARKER) {
                    self.start_metrics(None);
                }
            }
            LogSchema::Timestamped => {
                if let Some(caps) = send_marker().captures(line) {
                    self.open_exchange(caps[1].to_string())?;
                } else if let Some(caps) = receive_marker().captures(line) {
                    self.close_exchange(caps[1].to_string())?;
                }
            }
        }
        Ok(None)
    }

    fn claim_usage(&mut self, caps: &Captures<'_>) -> Result<PhaseInfo> {
        let role = caps[1].to_string();
        let phase_name = caps[2].to_string();
        let turn: u64 = caps[3].parse().map_err(|_| {
            UsageError::malformed(self.line_no, format!("turn number out of range: {}", &caps[3]))
        })?;

        let Some(usage_info) = self.pending.pop_front() else {
            return Err(UsageError::protocol(
                self.line_no,
                format!(
                    "phase marker '{}' turn {} has no recorded usage to claim",
                    phase_name, turn
                ),
            ));
        };

        debug!(
            line = self.line_no,
            role = %role,
            phase = %phase_name,
            turn,
            total_tokens = usage_info.total_tokens,
            "phase usage"
        );
        Ok(PhaseInfo {
            role,
            phase_name,
            turn,
            usage_info,
        })
    }

    fn open_exchange(&mut self, send_time: String) -> Result<()> {
        if let ParserState::AwaitingReceive { send_time: open } = &self.state {
            return Err(UsageError::protocol(
                self.line_no,
                format!(
                    "send marker while the exchange sent at {} is still awaiting its receive marker",
                    open
                ),
            ));
        }

        trace!(line = self.line_no, send_time = %send_time, "usage exchange opened");
        self.state = ParserState::AwaitingReceive { send_time };
        Ok(())
    }

    fn close_exchange(&mut self, recv_time: String) -> Result<()> {
        match mem::replace(&mut self.state, ParserState::Idle) {
            ParserState::AwaitingReceive { send_time } => {
                self.start_metrics(Some(Exchange {
                    send_time,
                    recv_time,
                }));
                Ok(())
            }
            _ => Err(UsageError::protocol(
                self.line_no,
                "receive marker without a pending send marker",
            )),
        }
    }

    fn start_metrics(&mut self, exchange: Option<Exchange>) {
        self.state = ParserState::CollectingMetrics(PendingUsage {
            exchange,
            progress: MetricProgress::Prompt,
        });
    }

    fn collect_metric(&mut self, pending: PendingUsage, line: &str) -> Result<()> {
        let expected = pending.progress.label();
        let Some(caps) = metric_line().captures(line) else {
            return Err(UsageError::malformed(
                self.line_no,
                format!("expected '{}: <integer>', found '{}'", expected, line),
            ));
        };

        let label = caps[1].trim();
        if label != expected {
            return Err(UsageError::malformed(
                self.line_no,
                format!("expected metric '{}', found '{}'", expected, label),
            ));
        }
        let value: u64 = caps[2].parse().map_err(|_| {
            UsageError::malformed(
                self.line_no,
                format!("value of '{}' out of range: {}", label, &caps[2]),
            )
        })?;

        let progress = match pending.progress {
            MetricProgress::Prompt => MetricProgress::Completion {
                prompt_tokens: value,
            },
            MetricProgress::Completion { prompt_tokens } => MetricProgress::Total {
                prompt_tokens,
                completion_tokens: value,
            },
            MetricProgress::Total {
                prompt_tokens,
                completion_tokens,
            } => {
                let usage = match pending.exchange {
                    Some(Exchange {
                        send_time,
                        recv_time,
                    }) => UsageInfo::timed(
                        prompt_tokens,
                        completion_tokens,
                        value,
                        send_time,
                        recv_time,
                    ),
                    None => UsageInfo::new(prompt_tokens, completion_tokens, value),
                };
                trace!(line = self.line_no, total_tokens = value, "usage record completed");
                self.pending.push_back(usage);
                self.state = ParserState::Idle;
                return Ok(());
            }
        };

        self.state = ParserState::CollectingMetrics(PendingUsage {
            progress,
            ..pending
        });
        Ok(())
    }
}

/// Lazy sequence of phase records over a line source.
///
/// Yields `Err` at most once, then stops.
pub struct PhaseRecords<I> {
    lines: I,
    state: Option<ParseState>,
}

impl<I, S> Iterator for PhaseRecords<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = Result<PhaseInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let state = self.state.as_mut()?;
            let Some(line) = self.lines.next() else {
                let state = self.state.take()?;
                return state.finish().err().map(Err);
            };

            match state.feed(line.as_ref()) {
                Ok(Some(phase)) => return Some(Ok(phase)),
                Ok(None) => {}
                Err(err) => {
                    self.state = None;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<I, S> FusedIterator for PhaseRecords<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
}

/// Parser for one log schema.
///
/// The parser holds no per-parse state; every call starts from an empty
/// accumulator and queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStreamParser {
    schema: LogSchema,
}

impl LogStreamParser {
    pub fn new(schema: LogSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> LogSchema {
        self.schema
    }

    /// Lazily parse `lines`.
    pub fn records<I, S>(&self, lines: I) -> PhaseRecords<I::IntoIter>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        PhaseRecords {
            lines: lines.into_iter(),
            state: Some(ParseState::new(self.schema)),
        }
    }

    /// Parse all of `lines`; any error discards the whole result.
    pub fn parse<I, S>(&self, lines: I) -> Result<Vec<PhaseInfo>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.records(lines).collect()
    }

    pub fn parse_str(&self, text: &str) -> Result<Vec<PhaseInfo>> {
        self.parse(text.lines())
    }

    /// Parse a buffered reader line by line.
    pub fn parse_reader<R: BufRead>(&self, reader: R) -> Result<Vec<PhaseInfo>> {
        let mut state = ParseState::new(self.schema);
        let mut phases = Vec::new();

        for line in reader.lines() {
            if let Some(phase) = state.feed(&line?)? {
                phases.push(phase);
            }
        }
        let lines = state.line_number();
        state.finish()?;

        debug!(schema = ?self.schema, lines, phases = phases.len(), "parsed usage log");
        Ok(phases)
    }
}
