use serde::{Deserialize, Serialize};

use crate::errors::{ProcessingError, WfErrorCode};

/// All-zero referenced message hash, used by original (non-referencing)
/// messages.
pub const ZERO_REFERENCE: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Direction a message travels through the relay. Assigned exactly once, on
/// entry to the tx or rx pipeline, and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransceiveDirection {
    Tx,
    Rx,
}

/// Whiteflag message type, one uppercase letter on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageCode {
    #[serde(rename = "A")]
    Authentication,
    #[serde(rename = "K")]
    Crypto,
    #[serde(rename = "F")]
    FreeText,
    #[serde(rename = "T")]
    Test,
    #[serde(rename = "P")]
    ProtectiveSign,
    #[serde(rename = "D")]
    DangerSign,
    #[serde(rename = "S")]
    StatusSignal,
    #[serde(rename = "E")]
    EmergencySignal,
    #[serde(rename = "I")]
    InfrastructureSign,
    #[serde(rename = "M")]
    MissionSignal,
    #[serde(rename = "Q")]
    RequestSignal,
    #[serde(rename = "R")]
    Resource,
}

impl MessageCode {
    pub fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'A' => Self::Authentication,
            'K' => Self::Crypto,
            'F' => Self::FreeText,
            'T' => Self::Test,
            'P' => Self::ProtectiveSign,
            'D' => Self::DangerSign,
            'S' => Self::StatusSignal,
            'E' => Self::EmergencySignal,
            'I' => Self::InfrastructureSign,
            'M' => Self::MissionSignal,
            'Q' => Self::RequestSignal,
            'R' => Self::Resource,
            _ => return None,
        })
    }

    pub fn as_char(&self) -> char {
        match self {
            Self::Authentication => 'A',
            Self::Crypto => 'K',
            Self::FreeText => 'F',
            Self::Test => 'T',
            Self::ProtectiveSign => 'P',
            Self::DangerSign => 'D',
            Self::StatusSignal => 'S',
            Self::EmergencySignal => 'E',
            Self::InfrastructureSign => 'I',
            Self::MissionSignal => 'M',
            Self::RequestSignal => 'Q',
            Self::Resource => 'R',
        }
    }

    /// Sign/signal messages share the fixed-layout body (P, D, S, E, I, M, Q).
    pub fn is_sign_signal(&self) -> bool {
        matches!(
            self,
            Self::ProtectiveSign
                | Self::DangerSign
                | Self::StatusSignal
                | Self::EmergencySignal
                | Self::InfrastructureSign
                | Self::MissionSignal
                | Self::RequestSignal
        )
    }
}

impl std::fmt::Display for MessageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// On-wire message header, 301 bits once encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageHeader {
    pub prefix: String,
    pub version: String,
    pub encryption_indicator: String,
    pub duress_indicator: String,
    pub message_code: MessageCode,
    pub reference_indicator: String,
    pub referenced_message: String,
}

impl MessageHeader {
    /// A plain header for the given code: no encryption, no duress, no
    /// reference.
    pub fn original(message_code: MessageCode) -> Self {
        Self {
            prefix: "WF".to_string(),
            version: "1".to_string(),
            encryption_indicator: "0".to_string(),
            duress_indicator: "0".to_string(),
            message_code,
            reference_indicator: "0".to_string(),
            referenced_message: ZERO_REFERENCE.to_string(),
        }
    }

    /// Encryption method digit, if the indicator parses.
    pub fn encryption_method(&self) -> Option<u8> {
        let mut chars = self.encryption_indicator.chars();
        let digit = chars.next()?.to_digit(10)? as u8;
        if chars.next().is_some() {
            return None;
        }
        Some(digit)
    }
}

/// Fixed-layout body shared by all sign/signal message types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignSignalBody {
    pub subject_code: String,
    pub date_time: String,
    pub duration: String,
    pub object_type: String,
    pub object_latitude: String,
    pub object_longitude: String,
    pub object_size_dim1: String,
    pub object_size_dim2: String,
    pub object_orientation: String,
    /// Request signals (Q) append object type / quantity pairs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_requests: Vec<ObjectRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectRequest {
    pub object_type: String,
    pub object_type_quant: String,
}

/// Message body, variant by message code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Test(TestBody),
    Authentication(AuthenticationBody),
    Crypto(CryptoBody),
    Resource(ResourceBody),
    FreeText(FreeTextBody),
    SignSignal(SignSignalBody),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthenticationBody {
    pub verification_method: String,
    pub verification_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CryptoBody {
    pub crypto_data_type: String,
    pub crypto_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceBody {
    pub resource_method: String,
    pub resource_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FreeTextBody {
    pub text: String,
}

/// Test messages carry a nested pseudo message code and the body belonging
/// to that code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestBody {
    pub pseudo_message_code: String,
    #[serde(flatten)]
    pub pseudo_body: Box<MessageBody>,
}

/// API-local message metadata. Never goes on the wire.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaHeader {
    pub blockchain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_depth: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originator_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originator_pub_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_init_vector: Option<String>,
    /// Transient key input supplied by the client. Never persisted, never
    /// logged.
    #[serde(default, skip_serializing)]
    pub encryption_key_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transceive_direction: Option<TransceiveDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originator_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmission_success: Option<bool>,
    #[serde(default)]
    pub auto_generated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
}

impl MetaHeader {
    /// Assigns the transceive direction. Fails if a different direction was
    /// assigned before; the direction is set exactly once per message.
    pub fn set_direction(
        &mut self,
        direction: TransceiveDirection,
    ) -> Result<(), ProcessingError> {
        match self.transceive_direction {
            None => {
                self.transceive_direction = Some(direction);
                Ok(())
            }
            Some(existing) if existing == direction => Ok(()),
            Some(existing) => Err(ProcessingError::new(
                WfErrorCode::MetaheaderError,
                format!("transceive direction already assigned as {existing:?}"),
            )),
        }
    }

    pub fn add_validation_error(&mut self, error: impl Into<String>) {
        self.validation_errors.push(error.into());
    }
}

// The key input must not leak through debug logging of the metaheader.
impl std::fmt::Debug for MetaHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaHeader")
            .field("blockchain", &self.blockchain)
            .field("transaction_hash", &self.transaction_hash)
            .field("block_number", &self.block_number)
            .field("block_depth", &self.block_depth)
            .field("transaction_time", &self.transaction_time)
            .field("originator_address", &self.originator_address)
            .field("recipient_address", &self.recipient_address)
            .field("encoded_message", &self.encoded_message)
            .field("encryption_init_vector", &self.encryption_init_vector)
            .field(
                "encryption_key_input",
                &self.encryption_key_input.as_ref().map(|_| "<redacted>"),
            )
            .field("transceive_direction", &self.transceive_direction)
            .field("format_valid", &self.format_valid)
            .field("reference_valid", &self.reference_valid)
            .field("originator_valid", &self.originator_valid)
            .field("transmission_success", &self.transmission_success)
            .field("auto_generated", &self.auto_generated)
            .field("confirmed", &self.confirmed)
            .field("validation_errors", &self.validation_errors)
            .finish()
    }
}

/// A Whiteflag message as handled by the relay.
///
/// Header and body are absent on a message that could not be decoded yet: an
/// encrypted message whose initialisation vector has not arrived keeps only
/// its metaheader (with the ciphertext) until the matching K-message pairs
/// up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WhiteflagMessage {
    pub meta_header: MetaHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_header: Option<MessageHeader>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_body: Option<MessageBody>,
}

impl WhiteflagMessage {
    pub fn new(
        blockchain: impl Into<String>,
        message_header: MessageHeader,
        message_body: MessageBody,
    ) -> Self {
        Self {
            meta_header: MetaHeader {
                blockchain: blockchain.into(),
                ..MetaHeader::default()
            },
            message_header: Some(message_header),
            message_body: Some(message_body),
        }
    }

    /// A message that is known only by its metaheader: ciphertext received,
    /// not yet decodable.
    pub fn undecoded(meta_header: MetaHeader) -> Self {
        Self {
            meta_header,
            message_header: None,
            message_body: None,
        }
    }

    pub fn is_decoded(&self) -> bool {
        self.message_header.is_some() && self.message_body.is_some()
    }

    pub fn code(&self) -> Option<MessageCode> {
        self.message_header.as_ref().map(|h| h.message_code)
    }

    /// Short context string for logging: type, hash if known.
    pub fn log_context(&self) -> String {
        let code = self
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".to_string());
        match &self.meta_header.transaction_hash {
            Some(hash) => format!("{code}({hash})"),
            None => format!("{code}(unsent)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_code_letters_round_trip() {
        for c in ['A', 'K', 'F', 'T', 'P', 'D', 'S', 'E', 'I', 'M', 'Q', 'R'] {
            assert_eq!(MessageCode::from_char(c).unwrap().as_char(), c);
        }
        assert!(MessageCode::from_char('X').is_none());
    }

    #[test]
    fn direction_is_assigned_exactly_once() {
        let mut meta = MetaHeader::default();
        meta.set_direction(TransceiveDirection::Tx).unwrap();
        meta.set_direction(TransceiveDirection::Tx).unwrap();
        assert!(meta.set_direction(TransceiveDirection::Rx).is_err());
    }

    #[test]
    fn key_input_is_redacted_in_debug_output() {
        let meta = MetaHeader {
            encryption_key_input: Some("deadbeef".to_string()),
            ..MetaHeader::default()
        };
        let debug = format!("{meta:?}");
        assert!(!debug.contains("deadbeef"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn metaheader_serde_uses_camel_case_and_drops_key_input() {
        let meta = MetaHeader {
            blockchain: "ethereum".to_string(),
            transaction_hash: Some("ab01".to_string()),
            encryption_key_input: Some("deadbeef".to_string()),
            ..MetaHeader::default()
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["transactionHash"], "ab01");
        assert!(json.get("encryptionKeyInput").is_none());
    }
}
