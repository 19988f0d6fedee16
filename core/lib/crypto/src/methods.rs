use const_decoder::Decoder;

use crate::errors::{CryptoError, CryptoResult};

/// HKDF salt for method 1 (ECDH-negotiated key), fixed by the protocol.
const METHOD_1_SALT: [u8; 32] =
    Decoder::Hex.decode(b"8ddb03085a2c15e69c35c224bce2952dca7878b42ce2862baa45f5d6dffbe0c0");

/// HKDF salt for method 2 (pre-shared key), fixed by the protocol.
const METHOD_2_SALT: [u8; 32] =
    Decoder::Hex.decode(b"c4d028bd45c876135e80ef7889835822a6f19a31835557d5854d1334e8497b56");

/// Encryption method selected by the header's encryption indicator digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMethod {
    /// Indicator 0: no encryption.
    NoEncryption,
    /// Indicator 1: AES-256-CTR with an ECDH-negotiated key.
    EcdhAesCtr,
    /// Indicator 2: AES-256-CTR with a pre-shared key.
    PskAesCtr,
}

impl EncryptionMethod {
    /// Parses the indicator digit. Digits 3-9 are reserved by the protocol.
    pub fn from_indicator(digit: u8) -> CryptoResult<Self> {
        match digit {
            0 => Ok(Self::NoEncryption),
            1 => Ok(Self::EcdhAesCtr),
            2 => Ok(Self::PskAesCtr),
            d => Err(CryptoError::ReservedMethod(d)),
        }
    }

    pub fn indicator(&self) -> u8 {
        match self {
            Self::NoEncryption => 0,
            Self::EcdhAesCtr => 1,
            Self::PskAesCtr => 2,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        !matches!(self, Self::NoEncryption)
    }

    /// AES-256 key length for the encrypting methods.
    pub fn key_length(&self) -> usize {
        32
    }

    pub(crate) fn salt(&self) -> Option<&'static [u8; 32]> {
        match self {
            Self::NoEncryption => None,
            Self::EcdhAesCtr => Some(&METHOD_1_SALT),
            Self::PskAesCtr => Some(&METHOD_2_SALT),
        }
    }
}
