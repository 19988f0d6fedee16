use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use wf_protocol::WhiteflagMessage;

use crate::{
    Datastore, DatastoreError, DatastoreResult, MessageQuery, StateEnvelope,
};

/// In-memory datastore driver. Used by the test suites and for embedded
/// operation without an external database.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    // Keyed by (blockchain, transaction hash): the hash is unique per chain.
    messages: Mutex<HashMap<(String, String), WhiteflagMessage>>,
    state: Mutex<Option<StateEnvelope>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn init(&self) -> DatastoreResult<()> {
        Ok(())
    }

    async fn close(&self) -> DatastoreResult<()> {
        Ok(())
    }

    async fn store_message(&self, message: &WhiteflagMessage) -> DatastoreResult<()> {
        let hash = message
            .meta_header
            .transaction_hash
            .as_ref()
            .ok_or(DatastoreError::UnkeyedMessage)?;
        let key = (
            message.meta_header.blockchain.clone(),
            wf_utils::normalize_hex(hash),
        );
        self.messages
            .lock()
            .map_err(|_| DatastoreError::Driver("poisoned lock".to_string()))?
            .insert(key, message.clone());
        Ok(())
    }

    async fn get_messages(&self, query: &MessageQuery) -> DatastoreResult<Vec<WhiteflagMessage>> {
        let messages = self
            .messages
            .lock()
            .map_err(|_| DatastoreError::Driver("poisoned lock".to_string()))?;
        Ok(messages
            .values()
            .filter(|message| query.matches(message))
            .cloned()
            .collect())
    }

    async fn store_state(&self, envelope: &StateEnvelope) -> DatastoreResult<()> {
        *self
            .state
            .lock()
            .map_err(|_| DatastoreError::Driver("poisoned lock".to_string()))? =
            Some(envelope.clone());
        Ok(())
    }

    async fn get_state(&self) -> DatastoreResult<Option<StateEnvelope>> {
        Ok(self
            .state
            .lock()
            .map_err(|_| DatastoreError::Driver("poisoned lock".to_string()))?
            .clone())
    }
}
