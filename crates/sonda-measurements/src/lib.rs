//! Measurement handlers for the Sonda probe.
//!
//! One handler per measurement kind, all behind the same contract:
//! validate options, apply the private-destination filter, drive the tool,
//! stream its output through the matching parser, enrich, and hand the
//! terminal body back to the dispatcher.

pub mod dns;
pub mod guard;
pub mod http;
pub mod mtr;
pub mod ping;
pub mod runner;
pub mod traceroute;
pub mod traits;
pub mod validate;

pub use traits::MeasurementHandler;

use sonda_common::{MeasurementSettings, ProbeConfig};
use sonda_lookup::Enricher;
use std::sync::Arc;

/// Shared resources every handler needs.
#[derive(Clone)]
pub struct HandlerContext {
    pub enricher: Enricher,
    pub settings: MeasurementSettings,
}

impl HandlerContext {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            enricher: Enricher::from_system(config.lookup.clone()),
            settings: config.measurement.clone(),
        }
    }
}

/// The full handler set, one per supported kind.
pub fn all_handlers(ctx: HandlerContext) -> Vec<Arc<dyn MeasurementHandler>> {
    vec![
        Arc::new(dns::DnsHandler::new(ctx.clone())),
        Arc::new(ping::PingHandler::new(ctx.clone())),
        Arc::new(traceroute::TracerouteHandler::new(ctx.clone())),
        Arc::new(mtr::MtrHandler::new(ctx.clone())),
        Arc::new(http::HttpHandler::new(ctx)),
    ]
}
