//! Metrics for the rx pipeline.

use vise::{Counter, Metrics};

#[derive(Debug, Metrics)]
#[metrics(prefix = "wf_receiver")]
pub(super) struct ReceiverMetrics {
    /// Messages that completed the rx pipeline.
    pub messages_processed: Counter,

    /// Messages that failed a rx pipeline stage.
    pub messages_failed: Counter,

    /// Messages decoded, including re-entries after IV pairing.
    pub messages_decoded: Counter,

    /// Encrypted messages held without an initialisation vector.
    pub messages_held_encrypted: Counter,

    /// Initialisation vectors queued before their ciphertext arrived.
    pub ivs_queued: Counter,
}

#[vise::register]
pub(super) static METRICS: vise::Global<ReceiverMetrics> = vise::Global::new();
