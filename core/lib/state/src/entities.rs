use serde::{Deserialize, Serialize};

/// A blockchain account owned by this relay. Private key material lives in
/// the keyring, never here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: String,
    pub public_key: String,
    #[serde(default)]
    pub transaction_count: u64,
    /// Chain-specific denomination, as a decimal string.
    #[serde(default)]
    pub balance: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainStatus {
    #[serde(default)]
    pub highest_block: u64,
}

/// Per-blockchain state record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainData {
    #[serde(default)]
    pub status: BlockchainStatus,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

/// A known message originator, keyed by blockchain address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Originator {
    pub name: String,
    pub address: String,
    pub blockchain: String,
    /// Keyring id of the shared authentication token, if method 2 applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
    /// Whether an authentication message from this originator verified.
    #[serde(default)]
    pub authenticated: bool,
}
