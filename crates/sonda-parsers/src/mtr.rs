//! Incremental parser for the `mtr --raw` event stream.
//!
//! The raw format emits one event per line, keyed by a 0-based hop index:
//! `h <idx> <addr>` (host discovered), `x <idx> <seq>` (probe transmitted),
//! `p <idx> <rtt_us>` (probe answered), `d <idx> <hostname>` (reverse DNS).
//! The parser keeps one accumulator per hop and can re-render the compact
//! hop table after every chunk.

use crate::lines::LineBuffer;
use crate::stats::hop_stats;
use sonda_common::{Hop, HopTiming};
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
struct MtrHop {
    address: Option<String>,
    hostname: Option<String>,
    sent: u32,
    rtts: Vec<f64>,
    duplicate: bool,
}

#[derive(Debug, Default)]
pub struct MtrParser {
    lines: LineBuffer,
    hops: Vec<MtrHop>,
    finished: bool,
}

impl MtrParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw stdout chunk; returns the addresses first seen in this
    /// chunk so the caller can start enrichment for them immediately.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        let mut new_addresses = Vec::new();
        for line in self.lines.push(chunk) {
            if let Some(addr) = self.feed_line(&line) {
                new_addresses.push(addr);
            }
        }
        new_addresses
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

    fn feed_line(&mut self, line: &str) -> Option<String> {
        let mut tokens = line.split_whitespace();
        let kind = tokens.next()?;
        if !matches!(kind, "h" | "x" | "p" | "d") {
            return None;
        }
        let index = tokens.next()?.parse::<usize>().ok()?;
        let value = tokens.next();

        if self.hops.len() <= index {
            self.hops.resize(index + 1, MtrHop::default());
        }

        match kind {
            "h" => {
                let addr = value?.to_string();
                let duplicate = self.hops[..index]
                    .iter()
                    .any(|hop| hop.address.as_deref() == Some(addr.as_str()));
                let hop = &mut self.hops[index];
                let newly_seen = hop.address.as_deref() != Some(addr.as_str());
                hop.address = Some(addr.clone());
                hop.duplicate = duplicate;
                newly_seen.then_some(addr)
            }
            "x" => {
                self.hops[index].sent += 1;
                None
            }
            "p" => {
                let rtt_us = value?.parse::<f64>().ok()?;
                self.hops[index].rtts.push(rtt_us / 1000.0);
                None
            }
            "d" => {
                self.hops[index].hostname = Some(value?.to_string());
                None
            }
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// All addresses recorded so far, in hop order, without duplicates.
    pub fn addresses(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for hop in &self.hops {
            if let Some(addr) = &hop.address {
                if !out.contains(addr) {
                    out.push(addr.clone());
                }
            }
        }
        out
    }

    /// The dense 1-based hops array, with ASN lists attached from the
    /// enrichment map (keyed by address).
    pub fn hops(&self, asn: &BTreeMap<String, Vec<u32>>) -> Vec<Hop> {
        self.hops
            .iter()
            .map(|acc| Hop {
                resolved_address: acc.address.clone(),
                resolved_hostname: acc.hostname.clone(),
                asn: acc
                    .address
                    .as_ref()
                    .and_then(|addr| asn.get(addr))
                    .cloned()
                    .unwrap_or_default(),
                timings: acc.rtts.iter().map(|&rtt| HopTiming { rtt }).collect(),
                stats: hop_stats(&acc.rtts, acc.sent),
                duplicate: acc.duplicate,
            })
            .collect()
    }

    /// The final responding hop, skipping duplicates: `(address, hostname)`.
    pub fn last_hop(&self) -> Option<(String, Option<String>)> {
        self.hops
            .iter()
            .rev()
            .filter(|hop| !hop.duplicate)
            .find_map(|hop| {
                hop.address
                    .as_ref()
                    .map(|addr| (addr.clone(), hop.hostname.clone()))
            })
    }

    /// Render the compact per-hop table used as `rawOutput`.
    pub fn render(&self, asn: &BTreeMap<String, Vec<u32>>) -> String {
        let mut out = String::from("Host Loss% Drop Rcv Avg StDev Javg\n");
        for (i, hop) in self.hops.iter().enumerate() {
            let stats = hop_stats(&hop.rtts, hop.sent);
            let label = match (&hop.address, &hop.hostname) {
                (Some(addr), Some(name)) => format!("{} ({})", name, addr),
                (Some(addr), None) => addr.clone(),
                _ => "(waiting for reply)".to_string(),
            };
            let asn_label = hop
                .address
                .as_ref()
                .and_then(|addr| asn.get(addr))
                .filter(|list| !list.is_empty())
                .map(|list| {
                    list.iter()
                        .map(|a| a.to_string())
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .unwrap_or_else(|| "???".to_string());
            let drop = hop.sent.saturating_sub(stats.count);
            out.push_str(&format!(
                "{}. AS{} {} {:.1}% {} {} {:.1} {:.1} {:.1}\n",
                i + 1,
                asn_label,
                label,
                stats.loss,
                drop,
                stats.count,
                stats.avg,
                stats.st_dev,
                stats.j_avg,
            ));
        }
        out
    }
}
