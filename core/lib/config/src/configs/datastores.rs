use serde::{Deserialize, Serialize};
use wf_events::EventKind;

/// Declaration of one datastore. Exactly one active datastore should be
/// declared `primary`; the registry downgrades later claimants.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DatastoreConfig {
    pub name: String,
    pub module: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub primary: bool,
    /// Rx-channel events on which this store receives the message. The
    /// recognised names are the closed pipeline event set.
    #[serde(default)]
    pub rx_store_event: Vec<EventKind>,
    /// Tx-channel events on which this store receives the message.
    #[serde(default)]
    pub tx_store_event: Vec<EventKind>,
    #[serde(default)]
    pub db_host: Option<String>,
    #[serde(default)]
    pub db_port: Option<u16>,
    #[serde(default)]
    pub db_protocol: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl DatastoreConfig {
    /// Creates a primary in-memory store declaration for unit tests.
    pub fn for_tests(name: &str, primary: bool) -> Self {
        Self {
            name: name.to_string(),
            module: "memory".to_string(),
            active: true,
            primary,
            rx_store_event: vec![EventKind::MessageProcessed, EventKind::MessageUpdated],
            tx_store_event: vec![EventKind::MessageProcessed, EventKind::MessageUpdated],
            db_host: None,
            db_port: None,
            db_protocol: None,
            database: None,
            directory: None,
            username: None,
            password: None,
        }
    }
}

fn default_true() -> bool {
    true
}
