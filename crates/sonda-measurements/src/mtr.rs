//! MTR measurement handler, backed by `mtr --raw`.
//!
//! The raw stream is parsed incrementally; on every stdout chunk the hop
//! table is rebuilt and re-emitted with `overwrite=true`, and ASN lookups
//! start for addresses the chunk revealed. Lookup results land in a shared
//! map and are attached wherever the address appears.

use crate::runner::ToolCommand;
use crate::traits::{diagnostic, MeasurementHandler};
use crate::{guard, validate, HandlerContext};
use async_trait::async_trait;
use sonda_common::{
    config, is_private_ip, MeasurementBody, MeasurementKind, MtrOptions, ProgressBody, Reporter,
    RouteResultBody,
};
use sonda_parsers::MtrParser;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

pub struct MtrHandler {
    ctx: HandlerContext,
}

impl MtrHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

/// Inter-packet interval in seconds. Development mode stretches it to go
/// easy on local networks.
fn packet_interval() -> &'static str {
    if config::development() {
        "1"
    } else {
        "0.5"
    }
}

fn mtr_args(opts: &MtrOptions) -> Vec<String> {
    let mut args = vec![
        "--raw".to_string(),
        "-4".to_string(),
        "-c".to_string(),
        opts.packets.unwrap_or(validate::DEFAULT_PACKETS).to_string(),
        "--interval".to_string(),
        packet_interval().to_string(),
        "--gracetime".to_string(),
        "3".to_string(),
        "--timeout".to_string(),
        "15".to_string(),
        "--max-ttl".to_string(),
        "30".to_string(),
    ];
    match opts.protocol.as_deref() {
        Some("tcp") => {
            args.push("--tcp".to_string());
            args.push("-P".to_string());
            args.push(opts.port.unwrap_or(80).to_string());
        }
        Some("udp") => {
            args.push("--udp".to_string());
            args.push("-P".to_string());
            args.push(opts.port.unwrap_or(80).to_string());
        }
        _ => {}
    }
    args.push(opts.target.clone());
    args
}

type AsnCache = Arc<Mutex<BTreeMap<String, Vec<u32>>>>;

fn snapshot(cache: &AsnCache) -> BTreeMap<String, Vec<u32>> {
    cache.lock().map(|map| map.clone()).unwrap_or_default()
}

#[async_trait]
impl MeasurementHandler for MtrHandler {
    fn kind(&self) -> MeasurementKind {
        MeasurementKind::Mtr
    }

    async fn run(
        &self,
        reporter: &Reporter,
        options: &serde_json::Value,
    ) -> anyhow::Result<MeasurementBody> {
        let opts = match validate::mtr(options) {
            Ok(opts) => opts,
            Err(e) => return Ok(self.empty_body(e.to_string())),
        };

        if let Err(e) =
            guard::ensure_public_target(&opts.target, self.ctx.enricher.resolver()).await
        {
            return Ok(self.empty_body(e.to_string()));
        }

        let mut parser = MtrParser::new();
        let asn_cache: AsnCache = Arc::new(Mutex::new(BTreeMap::new()));
        let mut lookups: JoinSet<()> = JoinSet::new();

        let run = {
            let enricher = self.ctx.enricher.clone();
            ToolCommand::new("mtr", mtr_args(&opts), self.ctx.settings.mtr_cap())
                .stream(|chunk| {
                    for address in parser.push(chunk) {
                        let Ok(ip) = address.parse::<IpAddr>() else {
                            continue;
                        };
                        if is_private_ip(ip) {
                            continue;
                        }
                        let enricher = enricher.clone();
                        let cache = asn_cache.clone();
                        lookups.spawn(async move {
                            let asn = enricher.asn_for(ip).await;
                            if let Ok(mut map) = cache.lock() {
                                map.insert(address, asn);
                            }
                        });
                    }

                    let asn = snapshot(&asn_cache);
                    reporter.progress(
                        ProgressBody {
                            raw_output: Some(parser.render(&asn)),
                            hops: Some(parser.hops(&asn)),
                        },
                        true,
                    );
                })
                .await
        };
        parser.finish();

        // Lookups are individually bounded by the per-query timeout, so
        // draining them cannot hang the handler for long.
        while lookups.join_next().await.is_some() {}

        match run {
            Ok(run) if run.success => {
                let asn = snapshot(&asn_cache);

                // A path that never produced a responding final hop reports
                // empty strings, not a stringified placeholder.
                let (resolved_address, mut resolved_hostname) =
                    parser.last_hop().unwrap_or_default();

                if resolved_hostname.is_none() && !resolved_address.is_empty() {
                    if let Ok(ip) = resolved_address.parse::<IpAddr>() {
                        resolved_hostname = self.ctx.enricher.reverse(ip).await;
                    }
                }

                Ok(MeasurementBody::Route(RouteResultBody {
                    resolved_address,
                    resolved_hostname: resolved_hostname.unwrap_or_default(),
                    hops: parser.hops(&asn),
                    raw_output: parser.render(&asn),
                }))
            }
            Ok(run) => Ok(self.empty_body(diagnostic_table(&parser, &asn_cache, &run.stderr))),
            Err(e) => Ok(self.empty_body(diagnostic_table(&parser, &asn_cache, &e.to_string()))),
        }
    }

    fn empty_body(&self, raw_output: String) -> MeasurementBody {
        MeasurementBody::Route(RouteResultBody {
            raw_output,
            ..Default::default()
        })
    }
}

/// Best diagnostic for a failed run: the partial hop table when any hop was
/// seen, the stderr/error text otherwise.
fn diagnostic_table(parser: &MtrParser, cache: &AsnCache, fallback: &str) -> String {
    if parser.is_empty() {
        diagnostic("", fallback)
    } else {
        parser.render(&snapshot(cache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mtr_args_icmp() {
        let opts = validate::mtr(&json!({"type": "mtr", "target": "example.com"})).unwrap();
        let args = mtr_args(&opts);
        assert_eq!(args[0], "--raw");
        assert_eq!(args[1], "-4");
        assert!(args.contains(&"--timeout".to_string()));
        assert!(args.contains(&"15".to_string()));
        assert!(!args.contains(&"--tcp".to_string()));
        assert_eq!(args.last().unwrap(), "example.com");
    }

    #[test]
    fn test_mtr_args_tcp_port() {
        let opts = validate::mtr(
            &json!({"type": "mtr", "target": "example.com", "protocol": "tcp", "port": 443, "packets": 5}),
        )
        .unwrap();
        let args = mtr_args(&opts);
        assert!(args.contains(&"--tcp".to_string()));
        let p = args.iter().position(|a| a == "-P").unwrap();
        assert_eq!(args[p + 1], "443");
        let c = args.iter().position(|a| a == "-c").unwrap();
        assert_eq!(args[c + 1], "5");
    }
}
