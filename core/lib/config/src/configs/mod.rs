pub mod blockchains;
pub mod datastores;
pub mod protocol;

use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

pub use self::blockchains::{BlockchainConfig, BlockRetrievalConfig, ConfirmationConfig, RpcConfig};
pub use self::datastores::DatastoreConfig;
pub use self::protocol::ProtocolConfig;

/// Complete relay configuration as loaded from the JSON config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RelayConfig {
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub blockchains: Vec<BlockchainConfig>,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub datastores: Vec<DatastoreConfig>,
}

impl RelayConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("cannot parse config file {}", path.display()))
    }
}
