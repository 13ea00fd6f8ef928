//! Parser for `traceroute` per-hop output lines.

use crate::lines::LineBuffer;
use crate::stats::hop_stats;
use sonda_common::{Hop, HopTiming};
use std::net::IpAddr;

#[derive(Debug, Default, Clone)]
struct HopAcc {
    address: Option<String>,
    hostname: Option<String>,
    rtts: Vec<f64>,
    timeouts: u32,
}

#[derive(Debug, Default)]
pub struct TracerouteParser {
    lines: LineBuffer,
    raw: String,
    resolved_address: String,
    resolved_hostname: String,
    hops: Vec<HopAcc>,
    finished: bool,
}

impl TracerouteParser {
    pub fn new() -> Self {
        Self::default()
    }

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

    pub fn resolved_address(&self) -> &str {
        &self.resolved_address
    }

    pub fn resolved_hostname(&self) -> &str {
        &self.resolved_hostname
    }

    /// The dense, 1-based hops array. Later occurrences of an address
    /// already recorded upstream are flagged `duplicate`.
    pub fn hops(&self) -> Vec<Hop> {
        let mut seen: Vec<&str> = Vec::new();
        self.hops
            .iter()
            .map(|acc| {
                let duplicate = match acc.address.as_deref() {
                    Some(addr) => {
                        let dup = seen.contains(&addr);
                        seen.push(addr);
                        dup
                    }
                    None => false,
                };
                Hop {
                    resolved_address: acc.address.clone(),
                    resolved_hostname: acc.hostname.clone(),
                    asn: Vec::new(),
                    timings: acc.rtts.iter().map(|&rtt| HopTiming { rtt }).collect(),
                    stats: hop_stats(&acc.rtts, acc.rtts.len() as u32 + acc.timeouts),
                    duplicate,
                }
            })
            .collect()
    }

    fn feed_line(&mut self, line: &str) {
        // "traceroute to google.com (142.250.74.46), 30 hops max, 60 byte packets"
        if let Some(rest) = line.strip_prefix("traceroute to ") {
            let mut tokens = rest.split_whitespace();
            if let Some(host) = tokens.next() {
                self.resolved_hostname = host.trim_end_matches(',').to_string();
            }
            if let Some(addr) = tokens.next() {
                self.resolved_address = addr
                    .trim_start_matches('(')
                    .trim_end_matches("),")
                    .trim_end_matches(')')
                    .to_string();
            }
            return;
        }

        //  " 3  ae-1.example.net (4.69.163.218)  1.200 ms  1.300 ms *"
        let mut tokens = line.split_whitespace().peekable();
        let Some(index) = tokens.next().and_then(|t| t.parse::<usize>().ok()) else {
            return;
        };
        if index == 0 {
            return;
        }

        // Hops are 1-based and dense; silent hops keep placeholder entries.
        if self.hops.len() < index {
            self.hops.resize(index, HopAcc::default());
        }
        let hop = &mut self.hops[index - 1];

        while let Some(token) = tokens.next() {
            if token == "*" {
                hop.timeouts += 1;
            } else if let Some(addr) = token
                .strip_prefix('(')
                .map(|t| t.trim_end_matches(')'))
                .filter(|t| t.parse::<IpAddr>().is_ok())
            {
                hop.address.get_or_insert_with(|| addr.to_string());
            } else if let Ok(rtt) = token.parse::<f64>() {
                if tokens.peek() == Some(&"ms") {
                    tokens.next();
                    hop.rtts.push(rtt);
                }
            } else if token.parse::<IpAddr>().is_ok() {
                // numeric-only rendering without parentheses
                hop.address.get_or_insert_with(|| token.to_string());
            } else if !token.starts_with('!') {
                hop.hostname.get_or_insert_with(|| token.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
traceroute to google.com (142.250.74.46), 30 hops max, 60 byte packets
 1  _gateway (203.0.114.1)  0.333 ms  0.244 ms  0.201 ms
 2  * * *
 3  ae-1.example.net (4.69.163.218)  1.200 ms  1.300 ms *
 4  142.250.74.46 (142.250.74.46)  12.100 ms  12.000 ms  12.200 ms
";

    #[test]
    fn test_header_line() {
        let mut parser = TracerouteParser::new();
        parser.push(SAMPLE);
        parser.finish();
        assert_eq!(parser.resolved_hostname(), "google.com");
        assert_eq!(parser.resolved_address(), "142.250.74.46");
    }

    #[test]
    fn test_dense_hops() {
        let mut parser = TracerouteParser::new();
        parser.push(SAMPLE);
        parser.finish();

        let hops = parser.hops();
        assert_eq!(hops.len(), 4);
        assert_eq!(hops[0].resolved_address.as_deref(), Some("203.0.114.1"));
        assert_eq!(hops[0].resolved_hostname.as_deref(), Some("_gateway"));
        assert_eq!(hops[0].timings.len(), 3);

        // Silent hop keeps its placeholder
        assert!(hops[1].resolved_address.is_none());
        assert_eq!(hops[1].stats.loss, 100.0);
        assert_eq!(hops[1].stats.count, 0);

        // Partial loss
        assert_eq!(hops[2].timings.len(), 2);
        assert!((hops[2].stats.loss - 33.33).abs() < 0.01);

        assert_eq!(hops[3].resolved_address.as_deref(), Some("142.250.74.46"));
    }

    #[test]
    fn test_gap_produces_placeholders() {
        let mut parser = TracerouteParser::new();
        parser.push(" 1  a.example (9.9.9.9)  1.0 ms\n 4  b.example (8.8.8.8)  2.0 ms\n");
        parser.finish();
        let hops = parser.hops();
        assert_eq!(hops.len(), 4);
        assert!(hops[1].resolved_address.is_none());
        assert!(hops[2].resolved_address.is_none());
    }

    #[test]
    fn test_duplicate_detection() {
        let mut parser = TracerouteParser::new();
        parser.push(" 1  a (9.9.9.9)  1.0 ms\n 2  b (8.8.8.8)  2.0 ms\n 3  a (9.9.9.9)  3.0 ms\n");
        parser.finish();
        let hops = parser.hops();
        assert!(!hops[0].duplicate);
        assert!(!hops[1].duplicate);
        assert!(hops[2].duplicate);
    }

    #[test]
    fn test_unknown_lines_preserved() {
        let mut parser = TracerouteParser::new();
        parser.push("some warning the tool printed\n 1  a (9.9.9.9)  1.0 ms\n");
        parser.finish();
        assert!(parser.raw_output().starts_with("some warning"));
        assert_eq!(parser.hops().len(), 1);
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let mut whole = TracerouteParser::new();
        whole.push(SAMPLE);
        whole.finish();

        let mut split = TracerouteParser::new();
        for chunk in SAMPLE.as_bytes().chunks(13) {
            split.push(std::str::from_utf8(chunk).unwrap());
        }
        split.finish();

        assert_eq!(whole.hops(), split.hops());
        assert_eq!(whole.raw_output(), split.raw_output());
    }
}
