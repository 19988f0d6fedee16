//! Protocol state of the relay: known blockchains with their accounts,
//! originators, the keyring and the working queues. All mutations go through
//! the [`StateManager`], which serialises writes and checkpoints a sealed
//! snapshot to the primary datastore on every change.

pub mod entities;
pub mod keyring;
pub mod manager;
pub mod negotiation;
pub mod queues;

pub use entities::{Account, BlockchainData, BlockchainStatus, Originator};
pub use keyring::KeyCategory;
pub use manager::StateManager;
pub use queues::{BlockDepthEntry, InitVectorEntry};
