//! HTTP measurement handler.

pub mod driver;
pub mod tls;

use crate::traits::MeasurementHandler;
use crate::{guard, validate, HandlerContext};
use async_trait::async_trait;
use driver::{HttpFailure, RequestPlan, WireProtocol, WireResponse};
use sonda_common::{HttpOptions, HttpResultBody, MeasurementBody, MeasurementKind, Reporter};
use std::collections::BTreeMap;

pub struct HttpHandler {
    ctx: HandlerContext,
}

impl HttpHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

fn plan_from(opts: &HttpOptions) -> RequestPlan {
    let protocol = match opts.query.protocol.as_deref() {
        Some("http") => WireProtocol::Http,
        Some("http2") => WireProtocol::Http2,
        _ => WireProtocol::Https,
    };
    RequestPlan {
        host: opts.target.clone(),
        port: opts.port.unwrap_or(match protocol {
            WireProtocol::Http => 80,
            _ => 443,
        }),
        protocol,
        method: opts.query.method.clone().unwrap_or_else(|| "head".to_string()),
        path: opts.query.path.clone().unwrap_or_else(|| "/".to_string()),
        query: opts.query.query.clone(),
        headers: opts.query.headers.clone().unwrap_or_default(),
        resolver: opts.query.resolver.clone(),
    }
}

/// Shape the terminal body from a completed exchange.
fn shape_body(wire: WireResponse, method: &str) -> HttpResultBody {
    let header_lines: Vec<String> = wire
        .header_lines
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect();

    // HTTP/2 keeps the :status pseudo-header in the raw form only
    let raw_headers = if wire.http_version == "2" {
        let mut all = vec![format!(":status: {}", wire.status_code)];
        all.extend(header_lines.iter().cloned());
        all.join("\n")
    } else {
        header_lines.join("\n")
    };

    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &wire.header_lines {
        headers
            .entry(name.to_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }

    let raw_output = if matches!(method, "head" | "options") {
        let status_line = format!("HTTP/{} {}", wire.http_version, wire.status_code);
        if header_lines.is_empty() {
            status_line
        } else {
            format!("{}\n{}", status_line, header_lines.join("\n"))
        }
    } else {
        wire.body.clone()
    };

    HttpResultBody {
        resolved_address: wire.resolved_address,
        status_code: wire.status_code,
        http_version: wire.http_version,
        headers,
        raw_headers,
        raw_body: wire.body,
        timings: wire.timings,
        tls: wire.tls,
        raw_output,
    }
}

/// Shape the terminal body from a failed exchange:
/// `rawOutput = "<message> - <code>"`, zero status, empty headers, and the
/// partial timings preserved.
fn failure_body(failure: HttpFailure) -> HttpResultBody {
    HttpResultBody {
        status_code: 0,
        timings: failure.timings,
        tls: failure.tls,
        raw_output: format!("{} - {}", failure.message, failure.code),
        ..Default::default()
    }
}

#[async_trait]
impl MeasurementHandler for HttpHandler {
    fn kind(&self) -> MeasurementKind {
        MeasurementKind::Http
    }

    async fn run(
        &self,
        reporter: &Reporter,
        options: &serde_json::Value,
    ) -> anyhow::Result<MeasurementBody> {
        let opts = match validate::http(options) {
            Ok(opts) => opts,
            Err(e) => return Ok(self.empty_body(e.to_string())),
        };

        if let Err(e) =
            guard::ensure_public_target(&opts.target, self.ctx.enricher.resolver()).await
        {
            return Ok(self.empty_body(e.to_string()));
        }

        let plan = plan_from(&opts);
        let outcome = driver::execute(
            &plan,
            self.ctx.enricher.resolver(),
            &self.ctx.settings,
            |chunk| reporter.append_output(chunk),
        )
        .await;

        match outcome {
            Ok(wire) => Ok(MeasurementBody::Http(shape_body(wire, &plan.method))),
            Err(failure) => Ok(MeasurementBody::Http(failure_body(*failure))),
        }
    }

    fn empty_body(&self, raw_output: String) -> MeasurementBody {
        MeasurementBody::Http(HttpResultBody {
            raw_output,
            ..Default::default()
        })
    }
}
