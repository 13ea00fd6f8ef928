//! DNS measurement handler, backed by `dig`.

use crate::runner::ToolCommand;
use crate::traits::{diagnostic, MeasurementHandler};
use crate::{guard, validate, HandlerContext};
use async_trait::async_trait;
use sonda_common::{
    DnsOptions, DnsResultBody, DnsTimings, MeasurementBody, MeasurementKind, Reporter,
};
use sonda_parsers::DigParser;

pub struct DnsHandler {
    ctx: HandlerContext,
}

impl DnsHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

fn dig_args(opts: &DnsOptions) -> Vec<String> {
    let query = &opts.query;
    let mut args = vec![
        opts.target.clone(),
        "-t".to_string(),
        query.record_type.clone().unwrap_or_else(|| "A".to_string()),
        "-p".to_string(),
        query.port.unwrap_or(53).to_string(),
        "+time=3".to_string(),
        "+tries=2".to_string(),
    ];
    if let Some(resolver) = &query.resolver {
        args.push(format!("@{}", resolver));
    }
    if query.protocol.as_deref() == Some("tcp") {
        args.push("+tcp".to_string());
    }
    if opts.trace {
        args.push("+trace".to_string());
    }
    args
}

#[async_trait]
impl MeasurementHandler for DnsHandler {
    fn kind(&self) -> MeasurementKind {
        MeasurementKind::Dns
    }

    async fn run(
        &self,
        reporter: &Reporter,
        options: &serde_json::Value,
    ) -> anyhow::Result<MeasurementBody> {
        let opts = match validate::dns(options) {
            Ok(opts) => opts,
            Err(e) => return Ok(self.empty_body(e.to_string())),
        };

        if let Err(e) =
            guard::ensure_public_target(&opts.target, self.ctx.enricher.resolver()).await
        {
            return Ok(self.empty_body(e.to_string()));
        }

        let mut parser = DigParser::new(opts.trace);
        let run = ToolCommand::new("dig", dig_args(&opts), self.ctx.settings.dns_cap())
            .stream(|chunk| {
                parser.push(chunk);
                reporter.append_output(chunk);
            })
            .await;
        parser.finish();

        match run {
            Ok(run) if run.success => Ok(MeasurementBody::Dns(DnsResultBody {
                answers: parser.answers().to_vec(),
                resolver: parser.resolver().to_string(),
                timings: DnsTimings {
                    total: parser.total_time_ms(),
                },
                raw_output: parser.raw_output().to_string(),
            })),
            Ok(run) => Ok(self.empty_body(diagnostic(parser.raw_output(), &run.stderr))),
            Err(e) => Ok(self.empty_body(diagnostic(parser.raw_output(), &e.to_string()))),
        }
    }

    fn empty_body(&self, raw_output: String) -> MeasurementBody {
        MeasurementBody::Dns(DnsResultBody {
            raw_output,
            ..Default::default()
        })
    }
}
