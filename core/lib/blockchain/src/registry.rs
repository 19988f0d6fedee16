use std::collections::HashMap;
use std::sync::Arc;

use wf_config::BlockchainConfig;
use wf_protocol::{ProcessingError, WfErrorCode};

use crate::traits::BlockchainAdapter;
use crate::types::AdapterResult;

struct RegisteredAdapter {
    config: BlockchainConfig,
    adapter: Arc<dyn BlockchainAdapter>,
}

/// Registry of blockchain adapters keyed by the configured blockchain name.
/// Registration is static: the server binary maps configured `module` names
/// to implementations at startup. Calls against unknown blockchains fail
/// `NotImplemented`; calls against disabled ones fail `NotAvailable`.
#[derive(Default)]
pub struct BlockchainRegistry {
    adapters: HashMap<String, RegisteredAdapter>,
}

impl BlockchainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &mut self,
        config: BlockchainConfig,
        adapter: Arc<dyn BlockchainAdapter>,
    ) -> AdapterResult<()> {
        if config.active {
            adapter.init(&config).await?;
            tracing::info!("initialised blockchain adapter for {}", config.name);
        } else {
            tracing::info!("blockchain {} is not active", config.name);
        }
        self.adapters
            .insert(config.name.clone(), RegisteredAdapter { config, adapter });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn BlockchainAdapter>, ProcessingError> {
        match self.adapters.get(name) {
            None => Err(ProcessingError::new(
                WfErrorCode::NotImplemented,
                format!("no adapter registered for blockchain {name:?}"),
            )),
            Some(registered) if !registered.config.active => Err(ProcessingError::new(
                WfErrorCode::NotAvailable,
                format!("blockchain {name:?} is not active"),
            )),
            Some(registered) => Ok(Arc::clone(&registered.adapter)),
        }
    }

    pub fn config(&self, name: &str) -> Option<&BlockchainConfig> {
        self.adapters.get(name).map(|registered| &registered.config)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.adapters
            .get(name)
            .map(|registered| registered.config.active)
            .unwrap_or(false)
    }

    /// Names of the enabled blockchains.
    pub fn enabled_names(&self) -> Vec<&str> {
        self.adapters
            .values()
            .filter(|registered| registered.config.active)
            .map(|registered| registered.config.name.as_str())
            .collect()
    }
}

impl std::fmt::Debug for BlockchainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainRegistry")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
