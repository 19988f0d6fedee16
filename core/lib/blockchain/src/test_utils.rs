//! Mock blockchain adapter for the test suites of the pipeline and tracker
//! crates. Deterministic where possible: transaction hashes are derived from
//! the message content and a send counter.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use wf_config::BlockchainConfig;
use wf_protocol::WhiteflagMessage;

use crate::traits::BlockchainAdapter;
use crate::types::{
    AccountKeys, AdapterError, AdapterResult, FundTransfer, JwsSignature, RawTransaction,
    SendReceipt, SignaturePayload, TransactionQuery,
};

#[derive(Debug, Default)]
struct MockState {
    block_height: u64,
    send_counter: u64,
    fail_sends: u32,
    sent: Vec<WhiteflagMessage>,
    transactions: HashMap<String, RawTransaction>,
    accounts: Vec<AccountKeys>,
}

/// A blockchain adapter that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MockAdapter {
    state: Mutex<MockState>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_height(height: u64) -> Self {
        let adapter = Self::default();
        adapter.set_block_height(height);
        adapter
    }

    pub fn set_block_height(&self, height: u64) {
        self.state.lock().unwrap().block_height = height;
    }

    /// Makes the next `count` sends fail, to exercise retry handling.
    pub fn fail_next_sends(&self, count: u32) {
        self.state.lock().unwrap().fail_sends = count;
    }

    /// Seeds a transaction for `get_message` lookups.
    pub fn add_transaction(&self, raw: RawTransaction) {
        self.state
            .lock()
            .unwrap()
            .transactions
            .insert(raw.transaction_hash.clone(), raw);
    }

    /// Moves a seeded transaction to another block, simulating a reorg.
    pub fn move_transaction(&self, transaction_hash: &str, block_number: u64) {
        if let Some(raw) = self
            .state
            .lock()
            .unwrap()
            .transactions
            .get_mut(transaction_hash)
        {
            raw.block_number = Some(block_number);
        }
    }

    pub fn add_account(&self, keys: AccountKeys) {
        self.state.lock().unwrap().accounts.push(keys);
    }

    /// Messages successfully sent through this adapter.
    pub fn sent_messages(&self) -> Vec<WhiteflagMessage> {
        self.state.lock().unwrap().sent.clone()
    }

    fn fabricate_hash(seed: &[u8], counter: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(counter.to_be_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl BlockchainAdapter for MockAdapter {
    async fn init(&self, _config: &BlockchainConfig) -> AdapterResult<()> {
        Ok(())
    }

    async fn send_message(&self, message: &WhiteflagMessage) -> AdapterResult<SendReceipt> {
        let mut state = self.state.lock().unwrap();
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(AdapterError::SendError("mock send failure".to_string()));
        }
        let encoded = message
            .meta_header
            .encoded_message
            .clone()
            .ok_or_else(|| AdapterError::SendError("message is not encoded".to_string()))?;
        state.send_counter += 1;
        let transaction_hash = Self::fabricate_hash(encoded.as_bytes(), state.send_counter);
        let block_number = Some(state.block_height);
        state.sent.push(message.clone());
        state.transactions.insert(
            transaction_hash.clone(),
            RawTransaction {
                transaction_hash: transaction_hash.clone(),
                block_number,
                transaction_time: None,
                originator_address: message
                    .meta_header
                    .originator_address
                    .clone()
                    .unwrap_or_default(),
                originator_pub_key: message.meta_header.originator_pub_key.clone(),
                recipient_address: message.meta_header.recipient_address.clone(),
                encoded_message: encoded,
            },
        );
        Ok(SendReceipt {
            transaction_hash,
            block_number,
        })
    }

    async fn get_message(&self, query: &TransactionQuery) -> AdapterResult<RawTransaction> {
        self.state
            .lock()
            .unwrap()
            .transactions
            .get(&query.transaction_hash)
            .cloned()
            .ok_or_else(|| AdapterError::TransactionNotFound(query.transaction_hash.clone()))
    }

    async fn request_signature(
        &self,
        payload: &SignaturePayload,
        _address: &str,
    ) -> AdapterResult<JwsSignature> {
        let protected =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&serde_json::json!({ "alg": "MOCK", "typ": "JWT" })).unwrap());
        let payload_b64 = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(payload).map_err(|err| AdapterError::SigningError(err.to_string()))?,
        );
        let mut hasher = Sha256::new();
        hasher.update(protected.as_bytes());
        hasher.update(b".");
        hasher.update(payload_b64.as_bytes());
        Ok(JwsSignature {
            protected,
            payload: payload_b64,
            signature: URL_SAFE_NO_PAD.encode(hasher.finalize()),
        })
    }

    async fn verify_signature(
        &self,
        jws: &JwsSignature,
        _public_key_hex: &str,
    ) -> AdapterResult<bool> {
        let mut hasher = Sha256::new();
        hasher.update(jws.protected.as_bytes());
        hasher.update(b".");
        hasher.update(jws.payload.as_bytes());
        Ok(jws.signature == URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }

    async fn request_keys(&self, public_key_hex: &str) -> AdapterResult<AccountKeys> {
        self.state
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|account| account.public_key == public_key_hex)
            .cloned()
            .ok_or_else(|| AdapterError::AccountNotFound(public_key_hex.to_string()))
    }

    async fn get_binary_address(&self, address: &str) -> AdapterResult<Vec<u8>> {
        wf_utils::decode_hex(address).map_err(|err| AdapterError::InvalidAddress(err.to_string()))
    }

    async fn transfer_funds(&self, transfer: &FundTransfer) -> AdapterResult<SendReceipt> {
        let mut state = self.state.lock().unwrap();
        state.send_counter += 1;
        Ok(SendReceipt {
            transaction_hash: Self::fabricate_hash(
                transfer.to_address.as_bytes(),
                state.send_counter,
            ),
            block_number: Some(state.block_height),
        })
    }

    async fn create_account(&self, secret: Option<String>) -> AdapterResult<AccountKeys> {
        let mut state = self.state.lock().unwrap();
        state.send_counter += 1;
        let seed = secret.unwrap_or_else(|| format!("mock-account-{}", state.send_counter));
        let digest = Sha256::digest(seed.as_bytes());
        let account = AccountKeys {
            address: hex::encode(&digest[..25]),
            public_key: format!("02{}", hex::encode(&digest[..16])),
            private_key: Some(hex::encode(digest)),
        };
        state.accounts.push(account.clone());
        Ok(account)
    }

    async fn update_account(&self, account: &AccountKeys) -> AdapterResult<()> {
        let mut state = self.state.lock().unwrap();
        match state
            .accounts
            .iter_mut()
            .find(|existing| existing.address == account.address)
        {
            Some(existing) => {
                *existing = account.clone();
                Ok(())
            }
            None => Err(AdapterError::AccountNotFound(account.address.clone())),
        }
    }

    async fn delete_account(&self, address: &str) -> AdapterResult<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.accounts.len();
        state.accounts.retain(|account| account.address != address);
        if state.accounts.len() == before {
            return Err(AdapterError::AccountNotFound(address.to_string()));
        }
        Ok(())
    }

    async fn get_block_height(&self) -> AdapterResult<u64> {
        Ok(self.state.lock().unwrap().block_height)
    }
}

#[cfg(test)]
mod tests {
    use wf_protocol::{FreeTextBody, MessageBody, MessageCode, MessageHeader};

    use super::*;

    fn encoded_message() -> WhiteflagMessage {
        let mut message = WhiteflagMessage::new(
            "ethereum",
            MessageHeader::original(MessageCode::FreeText),
            MessageBody::FreeText(FreeTextBody {
                text: "mock".to_string(),
            }),
        );
        message.meta_header.encoded_message = Some("57463130".to_string());
        message
    }

    #[tokio::test]
    async fn send_produces_retrievable_transaction() {
        let adapter = MockAdapter::with_block_height(100);
        let receipt = adapter.send_message(&encoded_message()).await.unwrap();
        assert_eq!(receipt.block_number, Some(100));

        let raw = adapter
            .get_message(&TransactionQuery {
                transaction_hash: receipt.transaction_hash.clone(),
            })
            .await
            .unwrap();
        assert_eq!(raw.encoded_message, "57463130");
    }

    #[tokio::test]
    async fn failing_sends_then_recovering() {
        let adapter = MockAdapter::new();
        adapter.fail_next_sends(1);
        assert!(adapter.send_message(&encoded_message()).await.is_err());
        assert!(adapter.send_message(&encoded_message()).await.is_ok());
        assert_eq!(adapter.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn signatures_verify_and_tampering_fails() {
        let adapter = MockAdapter::new();
        let payload = SignaturePayload {
            addr: "00aa".to_string(),
            orgname: "Example Org".to_string(),
            url: "https://example.org/auth.json".to_string(),
            extpubkey: None,
        };
        let mut jws = adapter.request_signature(&payload, "00aa").await.unwrap();
        assert!(adapter.verify_signature(&jws, "02bb").await.unwrap());
        jws.payload = URL_SAFE_NO_PAD.encode(b"{\"addr\":\"00bb\"}");
        assert!(!adapter.verify_signature(&jws, "02bb").await.unwrap());
    }

    #[tokio::test]
    async fn account_lifecycle() {
        let adapter = MockAdapter::new();
        let mut account = adapter.create_account(None).await.unwrap();
        account.public_key = "02ff".to_string();
        adapter.update_account(&account).await.unwrap();
        let found = adapter.request_keys("02ff").await.unwrap();
        assert_eq!(found.address, account.address);
        adapter.delete_account(&account.address).await.unwrap();
        assert!(adapter.request_keys("02ff").await.is_err());
    }
}
