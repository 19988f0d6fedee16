//! Metrics for the tx pipeline.

use vise::{Counter, Metrics};

#[derive(Debug, Metrics)]
#[metrics(prefix = "wf_transmitter")]
pub(super) struct TransmitterMetrics {
    /// Messages that completed the tx pipeline.
    pub messages_processed: Counter,

    /// Messages that failed a tx pipeline stage.
    pub messages_failed: Counter,

    /// Adapter send failures, including those that led to a retry.
    pub send_failures: Counter,

    /// Scheduled retries of auto-generated messages.
    pub retries_scheduled: Counter,
}

#[vise::register]
pub(super) static METRICS: vise::Global<TransmitterMetrics> = vise::Global::new();
