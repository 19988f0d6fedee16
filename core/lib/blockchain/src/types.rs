use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("send error: {0}")]
    SendError(String),

    #[error("other error: {0}")]
    Other(String),
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Receipt for a transaction submitted through an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    /// Lowercase hex without prefix.
    pub transaction_hash: String,
    /// Unset while the transaction is still in the mempool.
    pub block_number: Option<u64>,
}

/// Lookup of a single transaction on a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionQuery {
    pub transaction_hash: String,
}

/// Raw transaction data as an adapter returns it: the embedded message is
/// still encoded (and possibly encrypted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub transaction_hash: String,
    pub block_number: Option<u64>,
    /// ISO-8601, if the chain provides a timestamp.
    pub transaction_time: Option<String>,
    pub originator_address: String,
    pub originator_pub_key: Option<String>,
    pub recipient_address: Option<String>,
    /// The embedded Whiteflag message, hex.
    pub encoded_message: String,
}

/// Keys of a blockchain account as created or recovered by an adapter. The
/// private key goes straight into the keyring and is never logged.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountKeys {
    pub address: String,
    pub public_key: String,
    #[serde(skip_serializing)]
    pub private_key: Option<String>,
}

impl std::fmt::Debug for AccountKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountKeys")
            .field("address", &self.address)
            .field("public_key", &self.public_key)
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Value transfer between two accounts on one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundTransfer {
    pub from_address: String,
    pub to_address: String,
    /// Chain-specific denomination, as a decimal string.
    pub value: String,
}

/// Payload of an authentication signature (the JWS claims).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignaturePayload {
    /// The originator's blockchain address.
    pub addr: String,
    /// Organisation name of the originator.
    pub orgname: String,
    /// URL where the signature is published.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extpubkey: Option<String>,
}

/// A JWS in decomposed compact serialisation: three base64url segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwsSignature {
    pub protected: String,
    pub payload: String,
    pub signature: String,
}

impl JwsSignature {
    pub fn compact(&self) -> String {
        format!("{}.{}.{}", self.protected, self.payload, self.signature)
    }

    pub fn from_compact(compact: &str) -> AdapterResult<Self> {
        let mut parts = compact.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(protected), Some(payload), Some(signature), None) => Ok(Self {
                protected: protected.to_string(),
                payload: payload.to_string(),
                signature: signature.to_string(),
            }),
            _ => Err(AdapterError::SigningError(
                "not a compact JWS serialisation".to_string(),
            )),
        }
    }
}
