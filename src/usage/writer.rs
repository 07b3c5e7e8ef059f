//! Renders usage blocks and phase markers in the run-log format.

use std::io::Write;

use chrono::Local;

use super::parser::{RECEIVE_MARKER, SEND_MARKER};
use super::record::{LogSchema, PhaseInfo, UsageInfo, LOG_TIMESTAMP_FORMAT};
use crate::cost::format_cost;
use crate::error::Result;

/// Current local time in the log timestamp layout.
pub fn log_timestamp() -> String {
    Local::now().format(LOG_TIMESTAMP_FORMAT).to_string()
}

/// Writes the lines a model backend logs around each call.
///
/// Only model id, token counts and cost are written; credentials never
/// reach the log.
pub struct UsageLogWriter<W> {
    out: W,
    schema: LogSchema,
}

impl<W: Write> UsageLogWriter<W> {
    pub fn new(out: W, schema: LogSchema) -> Self {
        Self { out, schema }
    }

    pub fn schema(&self) -> LogSchema {
        self.schema
    }

    /// Send block: the marker line followed by the model id.
    pub fn send(&mut self, timestamp: &str, model_id: &str) -> Result<()> {
        writeln!(self.out, "[{} INFO] {}", timestamp, SEND_MARKER)?;
        writeln!(self.out, "model: {}", model_id)?;
        Ok(())
    }

    /// Receive block: the marker, the three metric lines and an optional cost line.
    pub fn receive(&mut self, timestamp: &str, usage: &UsageInfo, cost: Option<f64>) -> Result<()> {
        match self.schema {
            LogSchema::CountOnly => writeln!(self.out, "{}", RECEIVE_MARKER)?,
            LogSchema::Timestamped => writeln!(self.out, "[{} INFO] {}", timestamp, RECEIVE_MARKER)?,
        }
        writeln!(self.out, "prompt_tokens: {}", usage.prompt_tokens)?;
        writeln!(self.out, "completion_tokens: {}", usage.completion_tokens)?;
        writeln!(self.out, "total_tokens: {}", usage.total_tokens)?;
        if let Some(cost) = cost {
            writeln!(self.out, "cost: {}", format_cost(cost))?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    pub fn phase(&mut self, timestamp: &str, role: &str, phase_name: &str, turn: u64) -> Result<()> {
        writeln!(
            self.out,
            "[{} INFO] {}: **[Start Chat] on : {}, turn {}**",
            timestamp, role, phase_name, turn
        )?;
        writeln!(self.out)?;
        Ok(())
    }

    /// Write the full exchange that produced `record`, then its phase marker.
    ///
    /// Missing exchange timestamps are filled with the current time.
    pub fn write_phase_record(
        &mut self,
        model_id: &str,
        record: &PhaseInfo,
        cost: Option<f64>,
    ) -> Result<()> {
        let usage = &record.usage_info;
        let now = log_timestamp();
        let send_time = usage.send_time.as_deref().unwrap_or(&now);
        let recv_time = usage.recv_time.as_deref().unwrap_or(&now);

        self.send(send_time, model_id)?;
        self.receive(recv_time, usage, cost)?;
        self.phase(recv_time, &record.role, &record.phase_name, record.turn)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
