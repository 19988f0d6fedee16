//! The tx and rx pipelines advance a message through named stages; each
//! stage transition is observable as a named event on a broadcast channel.
//! Datastores, the confirmation tracker and external socket subscribers all
//! attach here rather than to the pipelines themselves.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use wf_protocol::WhiteflagMessage;

/// Events a subscriber may buffer before the channel starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Named pipeline events. The names form a closed set; datastore
/// configurations reference them verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    MessageCommitted,
    MetadataVerified,
    ReferenceVerified,
    ReferenceSkipped,
    MessageEncoded,
    MessageSent,
    MessageReceived,
    MessageDecoded,
    OriginatorVerified,
    OriginatorSkipped,
    MessageProcessed,
    MessageUpdated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageCommitted => "messageCommitted",
            Self::MetadataVerified => "metadataVerified",
            Self::ReferenceVerified => "referenceVerified",
            Self::ReferenceSkipped => "referenceSkipped",
            Self::MessageEncoded => "messageEncoded",
            Self::MessageSent => "messageSent",
            Self::MessageReceived => "messageReceived",
            Self::MessageDecoded => "messageDecoded",
            Self::OriginatorVerified => "originatorVerified",
            Self::OriginatorSkipped => "originatorSkipped",
            Self::MessageProcessed => "messageProcessed",
            Self::MessageUpdated => "messageUpdated",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two pipeline directions have independent channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Tx,
    Rx,
}

#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub channel: Channel,
    pub kind: EventKind,
    pub message: Arc<WhiteflagMessage>,
}

/// Broadcast hub for pipeline events. Cheap to clone behind an `Arc`;
/// emitting never blocks and never fails, even with no subscribers.
#[derive(Debug)]
pub struct EventBus {
    tx_channel: broadcast::Sender<MessageEvent>,
    rx_channel: broadcast::Sender<MessageEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx_channel, _) = broadcast::channel(capacity);
        let (rx_channel, _) = broadcast::channel(capacity);
        Self {
            tx_channel,
            rx_channel,
        }
    }

    pub fn emit(&self, channel: Channel, kind: EventKind, message: &WhiteflagMessage) {
        let event = MessageEvent {
            channel,
            kind,
            message: Arc::new(message.clone()),
        };
        // A send error only means nobody is listening right now.
        let _ = self.sender(channel).send(event);
    }

    pub fn subscribe(&self, channel: Channel) -> broadcast::Receiver<MessageEvent> {
        self.sender(channel).subscribe()
    }

    fn sender(&self, channel: Channel) -> &broadcast::Sender<MessageEvent> {
        match channel {
            Channel::Tx => &self.tx_channel,
            Channel::Rx => &self.rx_channel,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
