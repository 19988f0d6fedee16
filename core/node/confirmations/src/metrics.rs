//! Metrics for the confirmation tracker.

use vise::{Counter, Gauge, Metrics};

#[derive(Debug, Metrics)]
#[metrics(prefix = "wf_confirmations")]
pub(super) struct ConfirmationMetrics {
    /// Number of tracker ticks.
    pub ticks: Counter,

    /// Messages confirmed at the configured block depth.
    pub messages_confirmed: Counter,

    /// Entries dropped because their blockchain became unknown or disabled.
    pub entries_pruned: Counter,

    /// Current number of messages awaiting confirmation.
    pub queue_length: Gauge<u64>,
}

#[vise::register]
pub(super) static METRICS: vise::Global<ConfirmationMetrics> = vise::Global::new();
