//! Datastore abstraction: a uniform contract for message and state
//! persistence, a registry that designates exactly one primary store, and an
//! in-memory driver used for tests and embedded operation. Concrete database
//! drivers live outside the core and implement the same contract.

pub mod memory;
pub mod query;
pub mod registry;
pub mod sealer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wf_protocol::WhiteflagMessage;

pub use memory::MemoryDatastore;
pub use query::MessageQuery;
pub use registry::DatastoreRegistry;
pub use sealer::{PlainSealer, StateSealer};

#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("datastore driver error: {0}")]
    Driver(String),

    #[error("no primary datastore is configured")]
    NoPrimary,

    #[error("message has no transaction hash")]
    UnkeyedMessage,

    #[error("state container error: {0}")]
    Container(String),
}

pub type DatastoreResult<T> = Result<T, DatastoreError>;

/// Opaque at-rest container for a protocol state snapshot. The core never
/// looks inside; a [`StateSealer`] produces and opens it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEnvelope {
    /// Container format tag, e.g. `plain` or an encryption scheme id.
    pub format: String,
    /// The packaged snapshot.
    pub container: String,
}

/// The contract every datastore driver implements.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn init(&self) -> DatastoreResult<()>;
    async fn close(&self) -> DatastoreResult<()>;
    /// Upserts a message; `transactionHash` is unique per blockchain.
    async fn store_message(&self, message: &WhiteflagMessage) -> DatastoreResult<()>;
    async fn get_messages(&self, query: &MessageQuery) -> DatastoreResult<Vec<WhiteflagMessage>>;
    async fn store_state(&self, envelope: &StateEnvelope) -> DatastoreResult<()>;
    async fn get_state(&self) -> DatastoreResult<Option<StateEnvelope>>;
}

impl std::fmt::Debug for dyn Datastore + 'static {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datastore").finish()
    }
}
