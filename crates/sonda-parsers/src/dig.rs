//! Parser for `dig`-style sectioned output.
//!
//! Records are collected from blocks delimited by `;; <NAME> SECTION:`
//! headers. In trace mode (`dig +trace`) answers arrive as bare record
//! lines across several successive queries and are aggregated in stream
//! order.

use crate::lines::LineBuffer;
use sonda_common::{DnsAnswer, DnsValue};

#[derive(Debug)]
pub struct DigParser {
    trace: bool,
    lines: LineBuffer,
    raw: String,
    in_answer_section: bool,
    answers: Vec<DnsAnswer>,
    resolver: String,
    total_ms: u64,
    finished: bool,
}

impl DigParser {
    pub fn new(trace: bool) -> Self {
        Self {
            trace,
            lines: LineBuffer::new(),
            raw: String::new(),
            in_answer_section: false,
            answers: Vec::new(),
            resolver: String::new(),
            total_ms: 0,
            finished: false,
        }
    }

    /// Feed a raw stdout chunk. Chunk boundaries may fall anywhere.
    pub fn push(&mut self, chunk: &str) {
        self.raw.push_str(chunk);
        for line in self.lines.push(chunk) {
            self.feed_line(&line);
        }
    }

    /// Flush the trailing partial line. Idempotent.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(line) = self.lines.finish() {
            self.feed_line(&line);
        }
    }

    pub fn raw_output(&self) -> &str {
        &self.raw
    }

    pub fn answers(&self) -> &[DnsAnswer] {
        &self.answers
    }

    pub fn resolver(&self) -> &str {
        &self.resolver
    }

    /// `Query time: N msec`, summed across queries in trace mode; 0 when
    /// the line never appeared.
    pub fn total_time_ms(&self) -> u64 {
        self.total_ms
    }

    fn feed_line(&mut self, line: &str) {
        let trimmed = line.trim_end();

        if trimmed.is_empty() {
            // Sections end at the blank line
            self.in_answer_section = false;
            return;
        }

        if let Some(rest) = trimmed.strip_prefix(";; ") {
            if rest.ends_with("SECTION:") {
                self.in_answer_section = rest.starts_with("ANSWER");
            } else if let Some(value) = rest.strip_prefix("Query time:") {
                let ms = value
                    .trim()
                    .trim_end_matches("msec")
                    .trim()
                    .parse::<u64>()
                    .unwrap_or(0);
                self.total_ms += ms;
            } else if let Some(value) = rest.strip_prefix("SERVER:") {
                // ";; SERVER: 8.8.8.8#53(8.8.8.8) (UDP)"
                if let Some(address) = value.trim().split('#').next() {
                    self.resolver = address.to_string();
                }
            }
            return;
        }

        if trimmed.starts_with(';') {
            return;
        }

        if self.in_answer_section || self.trace {
            if let Some(answer) = parse_record(trimmed) {
                self.answers.push(answer);
            }
        }
    }
}

/// Parse one whitespace-separated record line:
/// `<name> <ttl> <class> <type> <value...>`.
fn parse_record(line: &str) -> Option<DnsAnswer> {
    let columns: Vec<&str> = line.split_whitespace().collect();
    if columns.len() < 5 {
        return None;
    }

    let ttl = columns[1].parse::<u32>().ok()?;
    let record_type = columns[3].to_string();

    let value = match record_type.as_str() {
        "SOA" | "TXT" => DnsValue::Text(columns[4..].join(" ")),
        "MX" => DnsValue::Mx {
            priority: columns[4].parse().ok()?,
            server: columns[5..].first()?.to_string(),
        },
        _ => DnsValue::Text(columns.last()?.to_string()),
    };

    Some(DnsAnswer {
        name: columns[0].to_string(),
        record_type,
        ttl,
        class: columns[2].to_string(),
        value,
    })
}
