//! Ping measurement handler, backed by the system `ping`.

use crate::runner::ToolCommand;
use crate::traits::{diagnostic, MeasurementHandler};
use crate::{guard, validate, HandlerContext};
use async_trait::async_trait;
use sonda_common::{MeasurementBody, MeasurementKind, PingOptions, PingResultBody, Reporter};
use sonda_parsers::PingParser;

pub struct PingHandler {
    ctx: HandlerContext,
}

impl PingHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

fn ping_args(opts: &PingOptions) -> Vec<String> {
    vec![
        "-4".to_string(),
        "-O".to_string(),
        "-i".to_string(),
        "0.5".to_string(),
        "-w".to_string(),
        "10".to_string(),
        "-c".to_string(),
        opts.packets.unwrap_or(validate::DEFAULT_PACKETS).to_string(),
        opts.target.clone(),
    ]
}

#[async_trait]
impl MeasurementHandler for PingHandler {
    fn kind(&self) -> MeasurementKind {
        MeasurementKind::Ping
    }

    async fn run(
        &self,
        reporter: &Reporter,
        options: &serde_json::Value,
    ) -> anyhow::Result<MeasurementBody> {
        let opts = match validate::ping(options) {
            Ok(opts) => opts,
            Err(e) => return Ok(self.empty_body(e.to_string())),
        };

        if let Err(e) =
            guard::ensure_public_target(&opts.target, self.ctx.enricher.resolver()).await
        {
            return Ok(self.empty_body(e.to_string()));
        }

        let mut parser = PingParser::new();
        let run = ToolCommand::new("ping", ping_args(&opts), self.ctx.settings.ping_cap())
            .unbuffered()
            .stream(|chunk| {
                parser.push(chunk);
                reporter.append_output(chunk);
            })
            .await;
        parser.finish();

        match run {
            Ok(run) if run.success => Ok(MeasurementBody::Ping(PingResultBody {
                resolved_address: parser.resolved_address().to_string(),
                resolved_hostname: parser.resolved_hostname().to_string(),
                loss: parser.loss(),
                min: parser.min(),
                avg: parser.avg(),
                max: parser.max(),
                times: parser.times().to_vec(),
                raw_output: parser.raw_output().to_string(),
            })),
            Ok(run) => Ok(self.empty_body(diagnostic(parser.raw_output(), &run.stderr))),
            Err(e) => Ok(self.empty_body(diagnostic(parser.raw_output(), &e.to_string()))),
        }
    }

    fn empty_body(&self, raw_output: String) -> MeasurementBody {
        MeasurementBody::Ping(PingResultBody {
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
    fn test_ping_args() {
        let opts =
            validate::ping(&json!({"type": "ping", "target": "example.com", "packets": 5})).unwrap();
        assert_eq!(
            ping_args(&opts),
            vec!["-4", "-O", "-i", "0.5", "-w", "10", "-c", "5", "example.com"]
        );
    }

    #[test]
    fn test_ping_args_default_packets() {
        let opts = validate::ping(&json!({"type": "ping", "target": "example.com"})).unwrap();
        assert!(ping_args(&opts).contains(&"3".to_string()));
    }
}
