use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use wf_authentication::Authenticator;
use wf_blockchain::BlockchainRegistry;
use wf_config::RelayConfig;
use wf_confirmations::ConfirmationTracker;
use wf_datastore::{DatastoreRegistry, MemoryDatastore, PlainSealer};
use wf_events::EventBus;
use wf_receiver::Receiver;
use wf_references::ReferenceValidator;
use wf_retrieval::Retriever;
use wf_state::StateManager;
use wf_transmitter::Transmitter;

/// The assembled relay node. The transmitter and receiver are driven by the
/// embedding API layer and the blockchain adapter listeners; this binary
/// owns their lifecycle, the event wiring and the confirmation tracker.
pub struct RelayNode {
    pub transmitter: Arc<Transmitter>,
    pub receiver: Arc<Receiver>,
    datastores: Arc<DatastoreRegistry>,
    stop_sender: watch::Sender<bool>,
    tracker_handle: JoinHandle<anyhow::Result<()>>,
    store_handle: JoinHandle<()>,
}

impl RelayNode {
    pub async fn build(config: RelayConfig) -> anyhow::Result<Self> {
        let mut datastores = DatastoreRegistry::new();
        for store_config in &config.datastores {
            match store_config.module.as_str() {
                "memory" => {
                    datastores
                        .register(store_config.clone(), Arc::new(MemoryDatastore::new()))
                        .await?;
                }
                module => {
                    // Concrete database drivers register here.
                    tracing::warn!(
                        "no datastore driver available for module {module:?}, skipping {}",
                        store_config.name
                    );
                }
            }
        }
        let datastores = Arc::new(datastores);

        let mut blockchains = BlockchainRegistry::new();
        for chain_config in &config.blockchains {
            // Chain adapters are external crates; they register here.
            tracing::warn!(
                "no blockchain adapter available for module {:?}, skipping {}",
                chain_config.module,
                chain_config.name
            );
        }
        let blockchains = Arc::new(blockchains);

        let events = Arc::new(EventBus::default());
        let store_handle = Arc::clone(&datastores).attach(&events);

        let state = Arc::new(StateManager::with_persistence(
            Arc::clone(&datastores),
            Arc::new(PlainSealer),
        ));
        state.restore().await?;

        let retriever = Arc::new(Retriever::new(
            Arc::clone(&datastores),
            Arc::clone(&blockchains),
            Arc::clone(&events),
        ));
        let references = Arc::new(ReferenceValidator::new(Arc::clone(&retriever)));
        let authenticator = Arc::new(Authenticator::new(
            Arc::clone(&retriever),
            Arc::clone(&blockchains),
            Arc::clone(&state),
        ));

        let transmitter = Arc::new(Transmitter::new(
            config.protocol.clone(),
            Arc::clone(&state),
            Arc::clone(&blockchains),
            Arc::clone(&references),
            Arc::clone(&events),
        ));
        let receiver = Arc::new(Receiver::new(
            config.protocol.clone(),
            Arc::clone(&state),
            Arc::clone(&blockchains),
            authenticator,
            Arc::clone(&references),
            Arc::clone(&retriever),
            Arc::clone(&events),
        ));

        let (stop_sender, stop_receiver) = watch::channel(false);
        let tracker = Arc::new(ConfirmationTracker::new(
            config.confirmation.clone(),
            Arc::clone(&state),
            Arc::clone(&datastores),
            Arc::clone(&blockchains),
            Arc::clone(&events),
        ));
        let tracker_handle = tokio::spawn(tracker.run(stop_receiver));

        tracing::info!("relay node assembled");
        Ok(Self {
            transmitter,
            receiver,
            datastores,
            stop_sender,
            tracker_handle,
            store_handle,
        })
    }

    /// Runs until interrupted, then shuts the components down in order.
    pub async fn run(self) -> anyhow::Result<()> {
        tokio::signal::ctrl_c().await?;
        tracing::info!("interrupt received, shutting down");

        self.stop_sender.send_replace(true);
        self.tracker_handle.await??;
        self.store_handle.abort();
        self.datastores.close_all().await;
        Ok(())
    }
}
