use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Block retrieval window and retry behaviour for one blockchain adapter.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BlockRetrievalConfig {
    /// Polling interval in milliseconds.
    #[serde(default = "default_retrieval_interval")]
    pub interval: u64,
    /// First block to retrieve; `None` resumes from the stored position.
    #[serde(default)]
    pub start: Option<u64>,
    /// Last block to retrieve; `None` follows the chain head.
    #[serde(default)]
    pub end: Option<u64>,
    /// Restart retrieval from `start` when the window is exhausted.
    #[serde(default)]
    pub restart: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for BlockRetrievalConfig {
    fn default() -> Self {
        Self {
            interval: default_retrieval_interval(),
            start: None,
            end: None,
            restart: false,
            max_retries: default_max_retries(),
        }
    }
}

/// RPC endpoint of a blockchain node.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RpcConfig {
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub path: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_rpc_timeout")]
    pub timeout: u64,
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

/// Declaration of one blockchain adapter. Adapters are selected by `name`;
/// `module` names the statically registered implementation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BlockchainConfig {
    pub name: String,
    pub module: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub testnet: Option<bool>,
    #[serde(default)]
    pub block_retrieval: BlockRetrievalConfig,
    #[serde(default = "default_batch_size")]
    pub transaction_batch_size: u32,
    #[serde(default)]
    pub transaction_fee: Option<String>,
    #[serde(default)]
    pub transaction_value: Option<String>,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl BlockchainConfig {
    /// Creates a config object suitable for use in unit tests.
    pub fn for_tests(name: &str) -> Self {
        Self {
            name: name.to_string(),
            module: "mock".to_string(),
            active: true,
            testnet: Some(true),
            block_retrieval: BlockRetrievalConfig::default(),
            transaction_batch_size: default_batch_size(),
            transaction_fee: None,
            transaction_value: None,
            rpc: RpcConfig::default(),
            username: None,
            password: None,
        }
    }
}

/// Confirmation tracker settings, shared across blockchains.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ConfirmationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Tracker tick interval in milliseconds.
    #[serde(default = "default_confirmation_interval")]
    pub interval: u64,
    /// Block depth at which a message counts as confirmed.
    #[serde(default = "default_max_block_depth")]
    pub max_block_depth: u64,
    /// Also emit an update event on every depth change below the threshold.
    #[serde(default)]
    pub update_each_block: bool,
}

impl ConfirmationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.interval)
    }

    /// Creates a config object suitable for use in unit tests.
    pub fn for_tests() -> Self {
        Self {
            enabled: true,
            interval: 100,
            max_block_depth: 8,
            update_each_block: false,
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_confirmation_interval(),
            max_block_depth: default_max_block_depth(),
            update_each_block: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_retrieval_interval() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    10
}

fn default_rpc_timeout() -> u64 {
    10_000
}

fn default_batch_size() -> u32 {
    128
}

fn default_confirmation_interval() -> u64 {
    10_000
}

fn default_max_block_depth() -> u64 {
    8
}
