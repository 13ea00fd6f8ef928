//! The uniform handler contract.

use async_trait::async_trait;
use sonda_common::{MeasurementBody, MeasurementKind, Reporter};

/// One measurement handler per kind.
///
/// `run` folds every expected failure (invalid options, private
/// destinations, tool and network errors) into the returned body, so a
/// reply always reaches the orchestrator. An `Err` is exceptional and is
/// caught by the dispatcher's last-resort funnel.
#[async_trait]
pub trait MeasurementHandler: Send + Sync {
    fn kind(&self) -> MeasurementKind;

    /// Execute one measurement to completion, emitting progress through the
    /// reporter. The terminal emit belongs to the dispatcher.
    async fn run(
        &self,
        reporter: &Reporter,
        options: &serde_json::Value,
    ) -> anyhow::Result<MeasurementBody>;

    /// An empty-but-valid body for this kind, carrying only a diagnostic
    /// `rawOutput`.
    fn empty_body(&self, raw_output: String) -> MeasurementBody;
}

/// Pick the best diagnostic text for a failed tool run: the captured stdout
/// when there is any, the fallback (stderr or error rendering) otherwise.
pub fn diagnostic(stdout: &str, fallback: &str) -> String {
    if stdout.trim().is_empty() {
        fallback.trim().to_string()
    } else {
        stdout.to_string()
    }
}
