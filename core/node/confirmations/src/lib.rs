//! Tracks relayed messages until they reach the configured block depth.
//! Subscribes to `messageProcessed` on both pipeline channels, keeps a
//! working queue in protocol state, and polls block heights every interval.
//! One periodic task per process; a tick never overlaps the previous one.

mod metrics;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use wf_blockchain::{BlockchainRegistry, TransactionQuery};
use wf_config::ConfirmationConfig;
use wf_datastore::{DatastoreRegistry, MessageQuery};
use wf_events::{Channel, EventBus, EventKind};
use wf_protocol::TransceiveDirection;
use wf_state::{BlockDepthEntry, StateManager};

use crate::metrics::METRICS;

pub struct ConfirmationTracker {
    config: ConfirmationConfig,
    state: Arc<StateManager>,
    datastores: Arc<DatastoreRegistry>,
    blockchains: Arc<BlockchainRegistry>,
    events: Arc<EventBus>,
}

impl ConfirmationTracker {
    pub fn new(
        config: ConfirmationConfig,
        state: Arc<StateManager>,
        datastores: Arc<DatastoreRegistry>,
        blockchains: Arc<BlockchainRegistry>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            state,
            datastores,
            blockchains,
            events,
        }
    }

    pub async fn run(
        self: Arc<Self>,
        mut stop_receiver: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        if !self.config.enabled {
            tracing::info!("confirmation tracking is disabled");
            return Ok(());
        }

        self.prune_unknown_chains().await;
        let listener = Arc::clone(&self).spawn_listener();

        let mut timer = tokio::time::interval(self.config.poll_interval());
        while !*stop_receiver.borrow_and_update() {
            tokio::select! {
                _ = timer.tick() => { /* continue iterations */ }
                _ = stop_receiver.changed() => break,
            }
            self.loop_iteration().await;
        }

        listener.abort();
        tracing::info!("stop signal received, confirmation tracker is shutting down");
        Ok(())
    }

    /// Drops queue entries whose blockchain is not known and enabled. Run at
    /// startup, before the first tick.
    pub(crate) async fn prune_unknown_chains(&self) {
        let blockchains = Arc::clone(&self.blockchains);
        let before = self.state.get_block_depths().await.len();
        self.state
            .prune_block_depths(|entry| blockchains.is_enabled(&entry.blockchain))
            .await;
        let after = self.state.get_block_depths().await.len();
        if before != after {
            METRICS.entries_pruned.inc_by((before - after) as u64);
            tracing::warn!(
                "pruned {} confirmation entries for unknown or disabled blockchains",
                before - after
            );
        }
    }

    /// Enqueues every processed message that made it into a block.
    pub(crate) fn spawn_listener(self: Arc<Self>) -> JoinHandle<()> {
        let mut tx_events = self.events.subscribe(Channel::Tx);
        let mut rx_events = self.events.subscribe(Channel::Rx);
        tokio::spawn(async move {
            let (mut tx_open, mut rx_open) = (true, true);
            loop {
                let (event, open) = tokio::select! {
                    event = tx_events.recv(), if tx_open => (event, &mut tx_open),
                    event = rx_events.recv(), if rx_open => (event, &mut rx_open),
                    else => break,
                };
                match event {
                    Ok(event) if event.kind == EventKind::MessageProcessed => {
                        self.enqueue(&event.message).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!("confirmation listener lagged by {missed} events");
                    }
                    Err(RecvError::Closed) => *open = false,
                }
            }
        })
    }

    async fn enqueue(&self, message: &wf_protocol::WhiteflagMessage) {
        let Some(block_number) = message.meta_header.block_number else {
            return;
        };
        let Some(hash) = message.meta_header.transaction_hash.clone() else {
            return;
        };
        let blockchain = message.meta_header.blockchain.clone();
        if !self.blockchains.is_enabled(&blockchain) {
            return;
        }
        self.state
            .upsert_block_depth(BlockDepthEntry {
                transaction_hash: hash,
                blockchain,
                block_number,
                block_depth: 0,
                confirmed: false,
                direction: message
                    .meta_header
                    .transceive_direction
                    .unwrap_or(TransceiveDirection::Rx),
            })
            .await;
        METRICS
            .queue_length
            .set(self.state.get_block_depths().await.len() as u64);
    }

    pub(crate) async fn loop_iteration(&self) {
        METRICS.ticks.inc();
        for entry in self.state.get_block_depths().await {
            if let Err(err) = self.update_entry(entry).await {
                tracing::warn!("confirmation update failed: {err}");
            }
        }
        METRICS
            .queue_length
            .set(self.state.get_block_depths().await.len() as u64);
    }

    async fn update_entry(&self, mut entry: BlockDepthEntry) -> anyhow::Result<()> {
        if !self.blockchains.is_enabled(&entry.blockchain) {
            self.state.remove_block_depth(&entry.transaction_hash).await;
            METRICS.entries_pruned.inc();
            return Ok(());
        }
        let highest = self
            .state
            .get_blockchain(&entry.blockchain)
            .await
            .map(|data| data.status.highest_block)
            .unwrap_or(0);
        let depth = highest.saturating_sub(entry.block_number);

        if depth == entry.block_depth && depth < self.config.max_block_depth {
            return Ok(());
        }

        if depth < self.config.max_block_depth {
            entry.block_depth = depth;
            self.state.upsert_block_depth(entry.clone()).await;
            if self.config.update_each_block {
                self.emit_update(&entry, depth, false).await;
            }
            return Ok(());
        }

        // Threshold reached: re-query the canonical block number before
        // declaring the message confirmed.
        let adapter = self.blockchains.get(&entry.blockchain)?;
        let raw = adapter
            .get_message(&TransactionQuery {
                transaction_hash: entry.transaction_hash.clone(),
            })
            .await?;
        if let Some(canonical) = raw.block_number {
            if canonical != entry.block_number {
                // The chain reorganised under the transaction.
                entry.block_number = canonical;
                entry.block_depth = highest.saturating_sub(canonical);
                self.state.upsert_block_depth(entry).await;
                return Ok(());
            }
        }

        self.emit_update(&entry, depth, true).await;
        self.state.remove_block_depth(&entry.transaction_hash).await;
        METRICS.messages_confirmed.inc();
        tracing::info!(
            "message {} on {} confirmed at depth {depth}",
            entry.transaction_hash,
            entry.blockchain
        );
        Ok(())
    }

    /// Updates the persisted message and emits `messageUpdated` on the
    /// channel matching the message's original direction.
    async fn emit_update(&self, entry: &BlockDepthEntry, depth: u64, confirmed: bool) {
        let primary = match self.datastores.primary() {
            Ok(primary) => primary,
            Err(err) => {
                tracing::error!("cannot update confirmed message: {err}");
                return;
            }
        };
        let stored = primary
            .get_messages(&MessageQuery::by_transaction_hash(
                &entry.transaction_hash,
                Some(&entry.blockchain),
            ))
            .await;
        let mut message = match stored {
            Ok(messages) => match messages.into_iter().next() {
                Some(message) => message,
                None => {
                    tracing::warn!(
                        "message {} is tracked but not stored",
                        entry.transaction_hash
                    );
                    return;
                }
            },
            Err(err) => {
                tracing::error!("cannot load tracked message: {err}");
                return;
            }
        };

        message.meta_header.block_depth = Some(depth);
        if confirmed {
            message.meta_header.confirmed = Some(true);
        }
        if let Err(err) = primary.store_message(&message).await {
            tracing::error!("cannot persist confirmation update: {err}");
        }

        let channel = match entry.direction {
            TransceiveDirection::Tx => Channel::Tx,
            TransceiveDirection::Rx => Channel::Rx,
        };
        self.events.emit(channel, EventKind::MessageUpdated, &message);
    }
}

impl std::fmt::Debug for ConfirmationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationTracker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
