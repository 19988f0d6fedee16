//! Configuration for the Whiteflag relay: protocol toggles, blockchain
//! adapter declarations, datastore declarations and the confirmation
//! tracker settings. Loaded from a JSON file by the server binary; tests
//! construct configs directly via the `for_tests` constructors.

pub mod configs;

pub use configs::{
    BlockchainConfig, BlockRetrievalConfig, ConfirmationConfig, DatastoreConfig, ProtocolConfig,
    RelayConfig, RpcConfig,
};
