//! Parser for iputils `ping` output.

use crate::lines::LineBuffer;
use sonda_common::PingTiming;

#[derive(Debug, Default)]
pub struct PingParser {
    lines: LineBuffer,
    raw: String,
    resolved_address: String,
    resolved_hostname: String,
    times: Vec<PingTiming>,
    loss: Option<f64>,
    min: Option<f64>,
    avg: Option<f64>,
    max: Option<f64>,
    finished: bool,
}

impl PingParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) {
        self.raw.push_str(chunk);
        for line in self.lines.push(chunk) {
            self.feed_line(&line);
        }
    }

    /// Flush the trailing partial line and fill summary fields from the
    /// per-packet times when ping was cut short of its summary block.
    /// Idempotent.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(line) = self.lines.finish() {
            self.feed_line(&line);
        }

        if self.min.is_none() && !self.times.is_empty() {
            let rtts: Vec<f64> = self.times.iter().map(|t| t.rtt).collect();
            self.min = Some(rtts.iter().copied().fold(f64::INFINITY, f64::min));
            self.max = Some(rtts.iter().copied().fold(f64::NEG_INFINITY, f64::max));
            self.avg = Some(rtts.iter().sum::<f64>() / rtts.len() as f64);
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

    pub fn times(&self) -> &[PingTiming] {
        &self.times
    }

    pub fn loss(&self) -> f64 {
        self.loss.unwrap_or(0.0)
    }

    pub fn min(&self) -> f64 {
        self.min.unwrap_or(0.0)
    }

    pub fn avg(&self) -> f64 {
        self.avg.unwrap_or(0.0)
    }

    pub fn max(&self) -> f64 {
        self.max.unwrap_or(0.0)
    }

    fn feed_line(&mut self, line: &str) {
        // "PING google.com (142.250.74.46) 56(84) bytes of data."
        if let Some(rest) = line.strip_prefix("PING ") {
            let mut tokens = rest.split_whitespace();
            if let Some(host) = tokens.next() {
                self.resolved_hostname = host.to_string();
            }
            if let Some(addr) = tokens.next() {
                self.resolved_address = addr
                    .trim_start_matches('(')
                    .trim_end_matches(')')
                    .to_string();
            }
            return;
        }

        // "64 bytes from lhr25s33 (142.250.74.46): icmp_seq=1 ttl=118 time=12.3 ms"
        if line.contains(" bytes from ") {
            if let Some(rtt) = extract_value(line, "time=") {
                self.times.push(PingTiming { rtt });
            }
            return;
        }

        // "3 packets transmitted, 3 received, 0% packet loss, time 2002ms"
        if line.contains("packets transmitted") {
            self.loss = line
                .split_whitespace()
                .find(|token| token.ends_with('%'))
                .and_then(|token| token.trim_end_matches('%').parse().ok());
            return;
        }

        // "rtt min/avg/max/mdev = 11.911/12.015/12.120/0.086 ms"
        if line.starts_with("rtt min/avg/max") || line.starts_with("round-trip min/avg/max") {
            if let Some(values) = line.split('=').nth(1) {
                let mut parts = values.trim().split('/');
                self.min = parts.next().and_then(|v| v.parse().ok());
                self.avg = parts.next().and_then(|v| v.parse().ok());
                self.max = parts
                    .next()
                    .and_then(|v| v.split_whitespace().next())
                    .and_then(|v| v.parse().ok());
            }
        }
    }
}

fn extract_value(line: &str, key: &str) -> Option<f64> {
    let start = line.find(key)? + key.len();
    line[start..]
        .split_whitespace()
        .next()?
        .parse::<f64>()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
PING google.com (142.250.74.46) 56(84) bytes of data.
64 bytes from lhr25s33-in-f14.1e100.net (142.250.74.46): icmp_seq=1 ttl=118 time=12.3 ms
64 bytes from lhr25s33-in-f14.1e100.net (142.250.74.46): icmp_seq=2 ttl=118 time=11.9 ms
64 bytes from lhr25s33-in-f14.1e100.net (142.250.74.46): icmp_seq=3 ttl=118 time=12.1 ms

--- google.com ping statistics ---
3 packets transmitted, 3 received, 0% packet loss, time 2002ms
rtt min/avg/max/mdev = 11.911/12.100/12.300/0.160 ms
";

    #[test]
    fn test_full_output() {
        let mut parser = PingParser::new();
        parser.push(SAMPLE);
        parser.finish();

        assert_eq!(parser.resolved_hostname(), "google.com");
        assert_eq!(parser.resolved_address(), "142.250.74.46");
        assert_eq!(parser.times().len(), 3);
        assert_eq!(parser.times()[0].rtt, 12.3);
        assert_eq!(parser.loss(), 0.0);
        assert_eq!(parser.min(), 11.911);
        assert_eq!(parser.avg(), 12.1);
        assert_eq!(parser.max(), 12.3);
        assert_eq!(parser.raw_output(), SAMPLE);
    }

    #[test]
    fn test_loss_parsed() {
        let mut parser = PingParser::new();
        parser.push("4 packets transmitted, 3 received, 25% packet loss, time 3004ms\n");
        parser.finish();
        assert_eq!(parser.loss(), 25.0);
    }

    #[test]
    fn test_summary_fallback_from_times() {
        let mut parser = PingParser::new();
        parser.push("PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.\n");
        parser.push("64 bytes from 8.8.8.8: icmp_seq=1 ttl=115 time=10.0 ms\n");
        parser.push("64 bytes from 8.8.8.8: icmp_seq=2 ttl=115 time=14.0 ms\n");
        // Tool killed before the summary block
        parser.finish();

        assert_eq!(parser.min(), 10.0);
        assert_eq!(parser.avg(), 12.0);
        assert_eq!(parser.max(), 14.0);
    }

    #[test]
    fn test_unknown_lines_preserved_verbatim() {
        let mut parser = PingParser::new();
        parser.push("something ping never prints\n");
        parser.finish();
        assert_eq!(parser.raw_output(), "something ping never prints\n");
        assert!(parser.times().is_empty());
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let mut whole = PingParser::new();
        whole.push(SAMPLE);
        whole.finish();

        let mut split = PingParser::new();
        for chunk in SAMPLE.as_bytes().chunks(11) {
            split.push(std::str::from_utf8(chunk).unwrap());
        }
        split.finish();

        assert_eq!(whole.times(), split.times());
        assert_eq!(whole.min(), split.min());
        assert_eq!(whole.raw_output(), split.raw_output());
    }
}
