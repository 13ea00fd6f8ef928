//! Request dispatch.
//!
//! One registry maps measurement kinds to handlers; every inbound request
//! runs as its own task. Whatever happens inside a handler, exactly one
//! terminal `probe:measurement:result` leaves per request: the dispatcher
//! owns the terminal emit, and its last-resort clause turns a handler error
//! into an empty-but-valid body instead of losing the reply.

use sonda_common::{
    EventSender, GenericResultBody, MeasurementBody, MeasurementKind, Reporter, RequestEnvelope,
    RequestReceiver,
};
use sonda_measurements::MeasurementHandler;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

pub struct Dispatcher {
    registry: HashMap<MeasurementKind, Arc<dyn MeasurementHandler>>,
    tx: EventSender,
}

impl Dispatcher {
    pub fn new(tx: EventSender, handlers: Vec<Arc<dyn MeasurementHandler>>) -> Self {
        let registry = handlers
            .into_iter()
            .map(|handler| (handler.kind(), handler))
            .collect();
        Self { registry, tx }
    }

    /// Launch one measurement. Requests are independent tasks; nothing is
    /// shared between them but the append-only event sender.
    pub fn dispatch(&self, request: RequestEnvelope) -> JoinHandle<()> {
        let reporter = Reporter::new(self.tx.clone(), &request);
        let handler = request
            .kind_tag()
            .and_then(MeasurementKind::parse)
            .and_then(|kind| self.registry.get(&kind).cloned());

        tokio::spawn(async move {
            let Some(handler) = handler else {
                let tag = request.kind_tag().unwrap_or("unknown").to_string();
                debug!(measurement_id = %request.measurement_id, tag, "unsupported measurement type");
                reporter.result(MeasurementBody::Generic(GenericResultBody {
                    raw_output: format!("Unsupported measurement type \"{}\"", tag),
                }));
                return;
            };

            let span = info_span!(
                "measurement",
                kind = %handler.kind(),
                measurement_id = %request.measurement_id,
                test_id = %request.test_id,
            );

            let body = match handler
                .run(&reporter, &request.measurement)
                .instrument(span)
                .await
            {
                Ok(body) => body,
                Err(e) => {
                    // Last resort: the reply must not be lost
                    error!(measurement_id = %request.measurement_id, "handler failed: {:#}", e);
                    handler.empty_body(format!("Measurement failed: {}", e))
                }
            };
            reporter.result(body);
        })
    }

    /// Consume inbound requests until the channel closes or shutdown is
    /// requested.
    pub async fn run(&self, mut rx: RequestReceiver, cancel: CancellationToken) {
        info!("dispatcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("dispatcher received cancellation signal, stopping");
                    break;
                }
                request = rx.recv() => {
                    match request {
                        Some(request) => {
                            self.dispatch(request);
                        }
                        None => {
                            debug!("request channel closed");
                            break;
                        }
                    }
                }
            }
        }
    }
}
