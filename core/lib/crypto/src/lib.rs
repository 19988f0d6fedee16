//! Cryptographic layer of the Whiteflag relay: method-indexed AES-256-CTR
//! message encryption, HKDF key derivation, ECDH key negotiation and
//! authentication token derivation.
//!
//! Key material handling follows one rule throughout: every derived key and
//! every intermediate copy of input keying material lives in a [`zeroize`]d
//! container and is wiped on all exit paths. Nothing in this crate logs key
//! bytes.

pub mod cipher;
pub mod ecdh;
pub mod errors;
pub mod keys;
pub mod methods;
pub mod tokens;

pub use cipher::{WfCipher, IV_BYTE_LENGTH};
pub use ecdh::EcdhKeypair;
pub use errors::{CryptoError, CryptoResult};
pub use keys::{derive_key, key_id};
pub use methods::EncryptionMethod;
pub use tokens::AuthToken;
