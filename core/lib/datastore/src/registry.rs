use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use wf_config::DatastoreConfig;
use wf_events::{Channel, EventBus, EventKind, MessageEvent};

use crate::{Datastore, DatastoreResult};

struct RegisteredDatastore {
    config: DatastoreConfig,
    driver: Arc<dyn Datastore>,
}

/// Registry of active datastores. Exactly one store holds the primary role:
/// the first one registered as primary keeps it, later claimants are
/// downgraded with a warning. Non-primary stores are write-only mirrors
/// driven by their configured store events.
#[derive(Default)]
pub struct DatastoreRegistry {
    stores: Vec<RegisteredDatastore>,
    primary: Option<usize>,
}

impl DatastoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialises the driver and adds it to the registry. Inactive
    /// declarations are skipped.
    pub async fn register(
        &mut self,
        mut config: DatastoreConfig,
        driver: Arc<dyn Datastore>,
    ) -> DatastoreResult<()> {
        if !config.active {
            tracing::info!("datastore {} is not active, skipping", config.name);
            return Ok(());
        }
        driver.init().await?;
        if config.primary {
            if let Some(primary) = self.primary {
                tracing::warn!(
                    "datastore {} also claims the primary role; {} keeps it",
                    config.name,
                    self.stores[primary].config.name
                );
                config.primary = false;
            } else {
                self.primary = Some(self.stores.len());
            }
        }
        tracing::info!(
            "initialised datastore {} (primary: {})",
            config.name,
            config.primary
        );
        self.stores.push(RegisteredDatastore { config, driver });
        Ok(())
    }

    /// The primary datastore. All state queries and message lookups go here.
    pub fn primary(&self) -> DatastoreResult<Arc<dyn Datastore>> {
        self.primary
            .map(|idx| Arc::clone(&self.stores[idx].driver))
            .ok_or(crate::DatastoreError::NoPrimary)
    }

    pub fn primary_name(&self) -> Option<&str> {
        self.primary
            .map(|idx| self.stores[idx].config.name.as_str())
    }

    /// Stores the event's message in every store subscribed to this event,
    /// and always in the primary for `messageProcessed`/`messageUpdated` on
    /// either channel.
    pub async fn dispatch(&self, event: &MessageEvent) {
        for (idx, store) in self.stores.iter().enumerate() {
            let subscriptions = match event.channel {
                Channel::Tx => &store.config.tx_store_event,
                Channel::Rx => &store.config.rx_store_event,
            };
            let primary_always = Some(idx) == self.primary
                && matches!(
                    event.kind,
                    EventKind::MessageProcessed | EventKind::MessageUpdated
                );
            if !subscriptions.contains(&event.kind) && !primary_always {
                continue;
            }
            if let Err(err) = store.driver.store_message(&event.message).await {
                tracing::error!(
                    "datastore {} failed to store {} on {}: {err}",
                    store.config.name,
                    event.message.log_context(),
                    event.kind
                );
            }
        }
    }

    /// Subscribes the registry to both pipeline channels and forwards events
    /// until the bus is dropped.
    pub fn attach(self: Arc<Self>, bus: &EventBus) -> JoinHandle<()> {
        let mut tx_events = bus.subscribe(Channel::Tx);
        let mut rx_events = bus.subscribe(Channel::Rx);
        tokio::spawn(async move {
            // Both channels are drained until closed; a closed channel must
            // not discard events still buffered on the other one.
            let (mut tx_open, mut rx_open) = (true, true);
            loop {
                let (event, open) = tokio::select! {
                    event = tx_events.recv(), if tx_open => (event, &mut tx_open),
                    event = rx_events.recv(), if rx_open => (event, &mut rx_open),
                    else => break,
                };
                match event {
                    Ok(event) => self.dispatch(&event).await,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!("datastore event subscription lagged by {missed} events");
                    }
                    Err(RecvError::Closed) => *open = false,
                }
            }
        })
    }

    pub async fn close_all(&self) {
        for store in &self.stores {
            if let Err(err) = store.driver.close().await {
                tracing::error!("failed to close datastore {}: {err}", store.config.name);
            }
        }
    }
}

impl std::fmt::Debug for DatastoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatastoreRegistry")
            .field(
                "stores",
                &self
                    .stores
                    .iter()
                    .map(|s| s.config.name.as_str())
                    .collect::<Vec<_>>(),
            )
            .field("primary", &self.primary_name())
            .finish()
    }
}
