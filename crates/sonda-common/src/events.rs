//! Control-channel event envelopes and the per-request reporter.
//!
//! The transport itself lives outside the core; the engine only sees an
//! append-only sender of outbound events and a stream of inbound requests.

use crate::types::{MeasurementBody, ProgressBody, RequestEnvelope};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

pub const EVENT_REQUEST: &str = "probe:measurement:request";
pub const EVENT_PROGRESS: &str = "probe:measurement:progress";
pub const EVENT_RESULT: &str = "probe:measurement:result";
pub const EVENT_READY: &str = "probe:status:ready";

/// Outbound event towards the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundEvent {
    Progress(ProgressEvent),
    Result(ResultEvent),
    Ready,
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::Progress(_) => EVENT_PROGRESS,
            OutboundEvent::Result(_) => EVENT_RESULT,
            OutboundEvent::Ready => EVENT_READY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub test_id: String,
    pub measurement_id: String,
    pub overwrite: bool,
    pub result: ProgressBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEvent {
    pub test_id: String,
    pub measurement_id: String,
    pub result: MeasurementBody,
}

/// Sender half of the outbound control channel. Emits never block: the
/// channel is unbounded and a closed receiver only means the worker is
/// shutting down, in which case events are dropped on the floor.
pub type EventSender = mpsc::UnboundedSender<OutboundEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<OutboundEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Inbound side: the transport adapter pushes parsed requests here.
pub type RequestSender = mpsc::UnboundedSender<RequestEnvelope>;
pub type RequestReceiver = mpsc::UnboundedReceiver<RequestEnvelope>;

pub fn request_channel() -> (RequestSender, RequestReceiver) {
    mpsc::unbounded_channel()
}

/// Per-request handle over the outbound sender, carrying the request ids.
///
/// Handlers emit progress through this; the terminal result emit belongs to
/// the dispatcher so that exactly one result leaves per request.
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: EventSender,
    test_id: String,
    measurement_id: String,
}

impl Reporter {
    pub fn new(tx: EventSender, request: &RequestEnvelope) -> Self {
        Self {
            tx,
            test_id: request.test_id.clone(),
            measurement_id: request.measurement_id.clone(),
        }
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    pub fn measurement_id(&self) -> &str {
        &self.measurement_id
    }

    /// Emit a progress event. `overwrite=true` replaces previously reported
    /// fields, `overwrite=false` appends to them.
    pub fn progress(&self, result: ProgressBody, overwrite: bool) {
        let event = OutboundEvent::Progress(ProgressEvent {
            test_id: self.test_id.clone(),
            measurement_id: self.measurement_id.clone(),
            overwrite,
            result,
        });
        if self.tx.send(event).is_err() {
            trace!(measurement_id = %self.measurement_id, "control channel closed, progress dropped");
        }
    }

    /// Append a raw-output chunk as incremental progress.
    pub fn append_output(&self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        self.progress(ProgressBody::output(chunk), false);
    }

    /// Emit the terminal result. Called exactly once per request, by the
    /// dispatcher.
    pub fn result(&self, result: MeasurementBody) {
        let event = OutboundEvent::Result(ResultEvent {
            test_id: self.test_id.clone(),
            measurement_id: self.measurement_id.clone(),
            result,
        });
        if self.tx.send(event).is_err() {
            trace!(measurement_id = %self.measurement_id, "control channel closed, result dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenericResultBody;

    fn request() -> RequestEnvelope {
        RequestEnvelope {
            measurement_id: "m1".to_string(),
            test_id: "t1".to_string(),
            measurement: serde_json::json!({"type": "ping"}),
        }
    }

    #[test]
    fn test_progress_event_shape() {
        let (tx, mut rx) = event_channel();
        let reporter = Reporter::new(tx, &request());
        reporter.append_output("PING example.com\n");

        let event = rx.try_recv().unwrap();
        assert_eq!(event.name(), EVENT_PROGRESS);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["testId"], "t1");
        assert_eq!(json["measurementId"], "m1");
        assert_eq!(json["overwrite"], false);
        assert_eq!(json["result"]["rawOutput"], "PING example.com\n");
    }

    #[test]
    fn test_empty_chunk_emits_nothing() {
        let (tx, mut rx) = event_channel();
        let reporter = Reporter::new(tx, &request());
        reporter.append_output("");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_result_event_shape() {
        let (tx, mut rx) = event_channel();
        let reporter = Reporter::new(tx, &request());
        reporter.result(MeasurementBody::Generic(GenericResultBody {
            raw_output: String::new(),
        }));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.name(), EVENT_RESULT);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["result"]["rawOutput"], "");
    }

    #[test]
    fn test_closed_channel_does_not_panic() {
        let (tx, rx) = event_channel();
        drop(rx);
        let reporter = Reporter::new(tx, &request());
        reporter.append_output("chunk");
    }
}
