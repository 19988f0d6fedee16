use serde::{Deserialize, Serialize};

/// Protocol behaviour toggles for the tx pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TxConfig {
    /// Verify references of outgoing messages before encoding.
    #[serde(default = "default_true")]
    pub verify_reference: bool,
    /// Only allow test messages to be sent, e.g. on a production chain used
    /// for trials.
    #[serde(default)]
    pub test_messages_only: bool,
}

/// Protocol behaviour toggles for the rx pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RxConfig {
    /// Verify references of incoming messages.
    #[serde(default = "default_true")]
    pub verify_reference: bool,
    /// Verify the originator of incoming messages.
    #[serde(default = "default_true")]
    pub verify_originator: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AuthenticationConfig {
    /// When set, authentication errors on incoming messages are fatal
    /// instead of being downgraded to warnings.
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct EncryptionConfig {
    /// Fallback pre-shared key (hex) for encryption method 2.
    #[serde(default)]
    pub psk: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub tx: TxConfig,
    #[serde(default)]
    pub rx: RxConfig,
    #[serde(default)]
    pub authentication: AuthenticationConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
}

fn default_true() -> bool {
    true
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            verify_reference: true,
            test_messages_only: false,
        }
    }
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            verify_reference: true,
            verify_originator: true,
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            tx: TxConfig::default(),
            rx: RxConfig::default(),
            authentication: AuthenticationConfig::default(),
            encryption: EncryptionConfig::default(),
        }
    }
}

impl ProtocolConfig {
    /// Creates a config object suitable for use in unit tests.
    pub fn for_tests() -> Self {
        Self::default()
    }
}
