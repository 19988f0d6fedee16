use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use wf_datastore::{DatastoreError, DatastoreRegistry, DatastoreResult, StateSealer};
use zeroize::Zeroizing;

use crate::entities::{Account, BlockchainData, Originator};
use crate::keyring::{KeyCategory, Keyring};
use crate::queues::{BlockDepthEntry, InitVectorEntry, Queue};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueuesState {
    #[serde(default)]
    block_depths: Queue<BlockDepthEntry>,
    #[serde(default)]
    init_vectors: Queue<InitVectorEntry>,
}

#[derive(Default)]
struct State {
    blockchains: HashMap<String, BlockchainData>,
    originators: HashMap<String, Originator>,
    queues: QueuesState,
    keyring: Keyring,
}

/// Serialised form of the state, packaged by a [`StateSealer`] before it
/// reaches the datastore.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateSnapshot {
    #[serde(default)]
    blockchains: HashMap<String, BlockchainData>,
    #[serde(default)]
    originators: HashMap<String, Originator>,
    #[serde(default)]
    queues: QueuesState,
    #[serde(default)]
    keys: HashMap<KeyCategory, HashMap<String, String>>,
}

struct Persistence {
    datastores: Arc<DatastoreRegistry>,
    sealer: Arc<dyn StateSealer>,
}

/// Owner of all protocol state. Writes are serialised behind one lock;
/// readers get cloned snapshots. Every mutation checkpoints the sealed state
/// to the primary datastore when persistence is attached.
pub struct StateManager {
    state: RwLock<State>,
    persistence: Option<Persistence>,
}

impl StateManager {
    /// Volatile state, for tests and tools.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            persistence: None,
        }
    }

    pub fn with_persistence(
        datastores: Arc<DatastoreRegistry>,
        sealer: Arc<dyn StateSealer>,
    ) -> Self {
        Self {
            state: RwLock::new(State::default()),
            persistence: Some(Persistence { datastores, sealer }),
        }
    }

    /// Restores state from the primary datastore. A missing snapshot leaves
    /// the state empty.
    pub async fn restore(&self) -> DatastoreResult<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        let Some(envelope) = persistence.datastores.primary()?.get_state().await? else {
            tracing::info!("no persisted state found, starting empty");
            return Ok(());
        };
        let raw = persistence.sealer.unseal(&envelope)?;
        let snapshot: StateSnapshot = serde_json::from_slice(&raw)
            .map_err(|err| DatastoreError::Container(err.to_string()))?;

        let mut state = self.state.write().await;
        state.blockchains = snapshot.blockchains;
        state.originators = snapshot.originators;
        state.queues = snapshot.queues;
        state.keyring = Keyring::from_snapshot(snapshot.keys)
            .map_err(|err| DatastoreError::Container(err.to_string()))?;
        tracing::info!("restored protocol state from the primary datastore");
        Ok(())
    }

    async fn checkpoint(&self, state: &State) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let snapshot = StateSnapshot {
            blockchains: state.blockchains.clone(),
            originators: state.originators.clone(),
            queues: QueuesState {
                block_depths: state.queues.block_depths.clone(),
                init_vectors: state.queues.init_vectors.clone(),
            },
            keys: state.keyring.to_snapshot(),
        };
        let result = serde_json::to_vec(&snapshot)
            .map_err(|err| DatastoreError::Container(err.to_string()))
            .and_then(|raw| persistence.sealer.seal(&raw));
        match result {
            Ok(envelope) => {
                let store = match persistence.datastores.primary() {
                    Ok(store) => store,
                    Err(err) => {
                        tracing::error!("cannot checkpoint state: {err}");
                        return;
                    }
                };
                if let Err(err) = store.store_state(&envelope).await {
                    tracing::error!("failed to checkpoint state: {err}");
                }
            }
            Err(err) => tracing::error!("failed to package state snapshot: {err}"),
        }
    }

    // Blockchains and accounts

    pub async fn upsert_blockchain(&self, name: &str, data: BlockchainData) {
        let mut state = self.state.write().await;
        state.blockchains.insert(name.to_string(), data);
        self.checkpoint(&state).await;
    }

    pub async fn get_blockchain(&self, name: &str) -> Option<BlockchainData> {
        self.state.read().await.blockchains.get(name).cloned()
    }

    pub async fn blockchain_names(&self) -> Vec<String> {
        self.state.read().await.blockchains.keys().cloned().collect()
    }

    pub async fn set_highest_block(&self, name: &str, height: u64) {
        let mut state = self.state.write().await;
        state
            .blockchains
            .entry(name.to_string())
            .or_default()
            .status
            .highest_block = height;
        self.checkpoint(&state).await;
    }

    pub async fn upsert_account(&self, blockchain: &str, account: Account) {
        let mut state = self.state.write().await;
        let accounts = &mut state
            .blockchains
            .entry(blockchain.to_string())
            .or_default()
            .accounts;
        match accounts
            .iter_mut()
            .find(|existing| existing.address.eq_ignore_ascii_case(&account.address))
        {
            Some(existing) => *existing = account,
            None => accounts.push(account),
        }
        self.checkpoint(&state).await;
    }

    pub async fn get_accounts(&self, blockchain: &str) -> Vec<Account> {
        self.state
            .read()
            .await
            .blockchains
            .get(blockchain)
            .map(|data| data.accounts.clone())
            .unwrap_or_default()
    }

    pub async fn remove_account(&self, blockchain: &str, address: &str) {
        let mut state = self.state.write().await;
        if let Some(data) = state.blockchains.get_mut(blockchain) {
            data.accounts
                .retain(|account| !account.address.eq_ignore_ascii_case(address));
        }
        self.checkpoint(&state).await;
    }

    // Originators

    pub async fn upsert_originator(&self, originator: Originator) {
        let mut state = self.state.write().await;
        state
            .originators
            .insert(originator.address.to_lowercase(), originator);
        self.checkpoint(&state).await;
    }

    pub async fn get_originator(&self, address: &str) -> Option<Originator> {
        self.state
            .read()
            .await
            .originators
            .get(&address.to_lowercase())
            .cloned()
    }

    pub async fn remove_originator(&self, address: &str) {
        let mut state = self.state.write().await;
        state.originators.remove(&address.to_lowercase());
        self.checkpoint(&state).await;
    }

    /// Reverse lookup from an auth token id to the originator it belongs to.
    pub async fn get_originator_by_auth_token(&self, auth_token_id: &str) -> Option<Originator> {
        self.state
            .read()
            .await
            .originators
            .values()
            .find(|originator| originator.auth_token_id.as_deref() == Some(auth_token_id))
            .cloned()
    }

    // Working queues

    pub async fn upsert_block_depth(&self, entry: BlockDepthEntry) {
        let mut state = self.state.write().await;
        state.queues.block_depths.upsert(entry);
        self.checkpoint(&state).await;
    }

    pub async fn get_block_depths(&self) -> Vec<BlockDepthEntry> {
        self.state.read().await.queues.block_depths.snapshot()
    }

    pub async fn remove_block_depth(&self, transaction_hash: &str) {
        let mut state = self.state.write().await;
        state.queues.block_depths.remove(transaction_hash);
        self.checkpoint(&state).await;
    }

    /// Drops confirmation entries whose blockchain fails the given predicate
    /// (unknown or disabled chains at startup).
    pub async fn prune_block_depths(&self, mut keep: impl FnMut(&BlockDepthEntry) -> bool) {
        let mut state = self.state.write().await;
        state.queues.block_depths.retain(&mut keep);
        self.checkpoint(&state).await;
    }

    pub async fn upsert_init_vector(&self, entry: InitVectorEntry) {
        let mut state = self.state.write().await;
        state.queues.init_vectors.upsert(entry);
        self.checkpoint(&state).await;
    }

    pub async fn get_init_vectors(&self) -> Vec<InitVectorEntry> {
        self.state.read().await.queues.init_vectors.snapshot()
    }

    /// Atomically removes and returns the queued IV for an encrypted
    /// message's transaction hash.
    pub async fn take_init_vector(&self, referenced_message: &str) -> Option<InitVectorEntry> {
        let mut state = self.state.write().await;
        let entry = state.queues.init_vectors.remove(referenced_message);
        if entry.is_some() {
            self.checkpoint(&state).await;
        }
        entry
    }

    // Keyring

    pub async fn upsert_key(&self, category: KeyCategory, id: &str, secret: Vec<u8>) {
        let mut state = self.state.write().await;
        state.keyring.upsert(category, id, secret);
        self.checkpoint(&state).await;
    }

    pub async fn get_key(&self, category: KeyCategory, id: &str) -> Option<Zeroizing<Vec<u8>>> {
        self.state.read().await.keyring.get(category, id)
    }

    pub async fn remove_key(&self, category: KeyCategory, id: &str) {
        let mut state = self.state.write().await;
        state.keyring.remove(category, id);
        self.checkpoint(&state).await;
    }

    pub async fn key_ids(&self, category: KeyCategory) -> Vec<String> {
        self.state.read().await.keyring.ids(category)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("persistent", &self.persistence.is_some())
            .finish()
    }
}
