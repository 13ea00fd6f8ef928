//! Traceroute measurement handler, backed by the system `traceroute`.

use crate::runner::ToolCommand;
use crate::traits::{diagnostic, MeasurementHandler};
use crate::{guard, validate, HandlerContext};
use async_trait::async_trait;
use sonda_common::{
    MeasurementBody, MeasurementKind, Reporter, RouteResultBody, TracerouteOptions,
};
use sonda_parsers::TracerouteParser;

pub struct TracerouteHandler {
    ctx: HandlerContext,
}

impl TracerouteHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

fn traceroute_args(opts: &TracerouteOptions) -> Vec<String> {
    let mut args = vec![
        "-4".to_string(),
        "-q".to_string(),
        "3".to_string(),
        "-w".to_string(),
        "2".to_string(),
    ];
    match opts.protocol.as_deref() {
        Some("tcp") => {
            args.push("-T".to_string());
            args.push("-p".to_string());
            args.push(opts.port.unwrap_or(80).to_string());
        }
        Some("udp") => {
            args.push("-U".to_string());
            args.push("-p".to_string());
            args.push(opts.port.unwrap_or(80).to_string());
        }
        _ => args.push("-I".to_string()),
    }
    args.push(opts.target.clone());
    args
}

#[async_trait]
impl MeasurementHandler for TracerouteHandler {
    fn kind(&self) -> MeasurementKind {
        MeasurementKind::Traceroute
    }

    async fn run(
        &self,
        reporter: &Reporter,
        options: &serde_json::Value,
    ) -> anyhow::Result<MeasurementBody> {
        let opts = match validate::traceroute(options) {
            Ok(opts) => opts,
            Err(e) => return Ok(self.empty_body(e.to_string())),
        };

        if let Err(e) =
            guard::ensure_public_target(&opts.target, self.ctx.enricher.resolver()).await
        {
            return Ok(self.empty_body(e.to_string()));
        }

        let mut parser = TracerouteParser::new();
        let run = ToolCommand::new(
            "traceroute",
            traceroute_args(&opts),
            self.ctx.settings.traceroute_cap(),
        )
        .unbuffered()
        .stream(|chunk| {
            parser.push(chunk);
            reporter.append_output(chunk);
        })
        .await;
        parser.finish();

        match run {
            Ok(run) if run.success => {
                let mut hops = parser.hops();

                // ASN enrichment for unique non-duplicate hop addresses
                let addresses: Vec<String> = hops
                    .iter()
                    .filter(|hop| !hop.duplicate)
                    .filter_map(|hop| hop.resolved_address.clone())
                    .collect();
                let asn = self.ctx.enricher.asn_batch(addresses).await;
                for hop in &mut hops {
                    if hop.duplicate {
                        continue;
                    }
                    if let Some(address) = &hop.resolved_address {
                        if let Some(list) = asn.get(address) {
                            hop.asn = list.clone();
                        }
                    }
                }

                Ok(MeasurementBody::Route(RouteResultBody {
                    resolved_address: parser.resolved_address().to_string(),
                    resolved_hostname: parser.resolved_hostname().to_string(),
                    hops,
                    raw_output: parser.raw_output().to_string(),
                }))
            }
            Ok(run) => Ok(self.empty_body(diagnostic(parser.raw_output(), &run.stderr))),
            Err(e) => Ok(self.empty_body(diagnostic(parser.raw_output(), &e.to_string()))),
        }
    }

    fn empty_body(&self, raw_output: String) -> MeasurementBody {
        MeasurementBody::Route(RouteResultBody {
            raw_output,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_icmp_args() {
        let opts =
            validate::traceroute(&json!({"type": "traceroute", "target": "example.com"})).unwrap();
        assert_eq!(
            traceroute_args(&opts),
            vec!["-4", "-q", "3", "-w", "2", "-I", "example.com"]
        );
    }

    #[test]
    fn test_tcp_args_carry_port() {
        let opts = validate::traceroute(
            &json!({"type": "traceroute", "target": "example.com", "protocol": "tcp", "port": 443}),
        )
        .unwrap();
        assert_eq!(
            traceroute_args(&opts),
            vec!["-4", "-q", "3", "-w", "2", "-T", "-p", "443", "example.com"]
        );
    }
}
