//! Blockchain abstraction: the adapter contract every supported chain
//! implements, and the registry dispatching calls by blockchain name.
//! Adapter implementations (Ethereum, Bitcoin, ...) live outside the core
//! and are registered statically by the server binary.

pub mod registry;
pub mod test_utils;
pub mod traits;
pub mod types;

pub use registry::BlockchainRegistry;
pub use traits::BlockchainAdapter;
pub use types::{
    AccountKeys, AdapterError, AdapterResult, FundTransfer, JwsSignature, RawTransaction,
    SendReceipt, SignaturePayload, TransactionQuery,
};
