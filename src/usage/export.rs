//! Tabular (CSV) and JSON reports of parsed phase records.

use std::io::{Read, Write};
use std::iter::Peekable;
use std::mem;
use std::str::Chars;

use super::record::{LogSchema, PhaseInfo, UsageInfo};
use crate::error::{Result, UsageError};

/// Write `phases` as CSV with the column set of `schema`.
pub fn write_csv<W: Write>(mut out: W, schema: LogSchema, phases: &[PhaseInfo]) -> Result<()> {
    writeln!(out, "{}", schema.columns().join(","))?;

    for phase in phases {
        let usage = &phase.usage_info;
        let mut fields = vec![
            quote(&phase.role),
            quote(&phase.phase_name),
            phase.turn.to_string(),
            usage.prompt_tokens.to_string(),
            usage.completion_tokens.to_string(),
            usage.total_tokens.to_string(),
        ];
        if schema == LogSchema::Timestamped {
            fields.push(quote(usage.send_time.as_deref().unwrap_or_default()));
            fields.push(quote(usage.recv_time.as_deref().unwrap_or_default()));
        }
        writeln!(out, "{}", fields.join(","))?;
    }

    out.flush()?;
    Ok(())
}

/// Read a report written by [`write_csv`] with the same schema.
pub fn read_csv<R: Read>(mut input: R, schema: LogSchema) -> Result<Vec<PhaseInfo>> {
    let mut text = String::new();
    input.read_to_string(&mut text)?;

    let mut rows = split_rows(&text)?.into_iter();
    let Some((line, header)) = rows.next() else {
        return Err(invalid(1, "report is empty"));
    };
    if header.iter().map(String::as_str).ne(schema.columns().iter().copied()) {
        return Err(invalid(
            line,
            format!("expected header '{}'", schema.columns().join(",")),
        ));
    }

    rows.map(|(line, fields)| phase_from_row(line, schema, fields))
        .collect()
}

/// Write `phases` as a pretty-printed JSON array.
pub fn write_json<W: Write>(mut out: W, phases: &[PhaseInfo]) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, phases)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn invalid(line: usize, message: impl Into<String>) -> UsageError {
    UsageError::InvalidReport {
        line,
        message: message.into(),
    }
}

fn phase_from_row(line: usize, schema: LogSchema, fields: Vec<String>) -> Result<PhaseInfo> {
    let columns = schema.columns();
    if fields.len() != columns.len() {
        return Err(invalid(
            line,
            format!("expected {} fields, found {}", columns.len(), fields.len()),
        ));
    }

    let mut fields = fields.into_iter();
    let mut next = || fields.next().unwrap_or_default();

    let role = next();
    let phase_name = next();
    let turn = parse_number(line, "turn", &next())?;
    let prompt_tokens = parse_number(line, "prompt_tokens", &next())?;
    let completion_tokens = parse_number(line, "completion_tokens", &next())?;
    let total_tokens = parse_number(line, "total_tokens", &next())?;

    let mut usage = UsageInfo::new(prompt_tokens, completion_tokens, total_tokens);
    if schema == LogSchema::Timestamped {
        usage.send_time = Some(next()).filter(|t| !t.is_empty());
        usage.recv_time = Some(next()).filter(|t| !t.is_empty());
    }

    Ok(PhaseInfo {
        role,
        phase_name,
        turn,
        usage_info: usage,
    })
}

fn parse_number<T: std::str::FromStr>(line: usize, column: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(line, format!("'{}' is not a valid {}", value, column)))
}

/// Split CSV text into rows, each tagged with the line it starts on.
fn split_rows(text: &str) -> Result<Vec<(usize, Vec<String>)>> {
    let mut rows = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut line = 1;
    let mut row_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if field.is_empty() => {
                line += read_quoted(&mut chars, &mut field).ok_or_else(|| {
                    invalid(row_line, "unterminated quoted field")
                })?;
                if let Some(&next) = chars.peek() {
                    if !matches!(next, ',' | '\n' | '\r') {
                        return Err(invalid(
                            line,
                            format!("unexpected '{}' after closing quote", next),
                        ));
                    }
                }
            }
            ',' => fields.push(mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(mem::take(&mut field));
                push_row(&mut rows, row_line, mem::take(&mut fields));
                line += 1;
                row_line = line;
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        push_row(&mut rows, row_line, fields);
    }
    Ok(rows)
}

/// Consume a quoted field body after its opening quote; returns the number
/// of newlines inside it, or `None` when the closing quote is missing.
fn read_quoted(chars: &mut Peekable<Chars<'_>>, field: &mut String) -> Option<usize> {
    let mut newlines = 0;
    while let Some(c) = chars.next() {
        match c {
            '"' if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            '"' => return Some(newlines),
            '\n' => {
                newlines += 1;
                field.push(c);
            }
            _ => field.push(c),
        }
    }
    None
}

fn push_row(rows: &mut Vec<(usize, Vec<String>)>, line: usize, fields: Vec<String>) {
    let blank = fields.len() == 1 && fields[0].is_empty();
    if !blank {
        rows.push((line, fields));
    }
}
