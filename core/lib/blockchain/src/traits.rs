use async_trait::async_trait;
use wf_config::BlockchainConfig;
use wf_protocol::WhiteflagMessage;

use crate::types::{
    AccountKeys, AdapterResult, FundTransfer, JwsSignature, RawTransaction, SendReceipt,
    SignaturePayload, TransactionQuery,
};

/// The operations every blockchain adapter provides to the core. One
/// implementation per supported chain, registered under the configured
/// blockchain name.
#[async_trait]
pub trait BlockchainAdapter: Send + Sync {
    async fn init(&self, config: &BlockchainConfig) -> AdapterResult<()>;

    /// Submits the encoded message as a transaction; returns its hash and,
    /// if already included, the block number.
    async fn send_message(&self, message: &WhiteflagMessage) -> AdapterResult<SendReceipt>;

    /// Looks up a transaction carrying a Whiteflag message.
    async fn get_message(&self, query: &TransactionQuery) -> AdapterResult<RawTransaction>;

    /// Produces a JWS over the authentication payload with the account's
    /// signing key. The signature scheme is chain-specific.
    async fn request_signature(
        &self,
        payload: &SignaturePayload,
        address: &str,
    ) -> AdapterResult<JwsSignature>;

    /// Verifies a JWS against an originator's public key, using the chain's
    /// signature scheme.
    async fn verify_signature(
        &self,
        jws: &JwsSignature,
        public_key_hex: &str,
    ) -> AdapterResult<bool>;

    /// Recovers the account keys belonging to a public key.
    async fn request_keys(&self, public_key_hex: &str) -> AdapterResult<AccountKeys>;

    /// The binary form of an address, used as HKDF info.
    async fn get_binary_address(&self, address: &str) -> AdapterResult<Vec<u8>>;

    async fn transfer_funds(&self, transfer: &FundTransfer) -> AdapterResult<SendReceipt>;

    /// Creates an account, optionally from existing secret material.
    async fn create_account(&self, secret: Option<String>) -> AdapterResult<AccountKeys>;

    async fn update_account(&self, account: &AccountKeys) -> AdapterResult<()>;

    async fn delete_account(&self, address: &str) -> AdapterResult<()>;

    /// The highest block the adapter has seen.
    async fn get_block_height(&self) -> AdapterResult<u64>;
}

impl std::fmt::Debug for dyn BlockchainAdapter + 'static {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainAdapter").finish()
    }
}
