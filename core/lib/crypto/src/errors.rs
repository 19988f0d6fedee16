use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption method {0} is reserved")]
    ReservedMethod(u8),

    #[error("no encryption key available for method {0}")]
    NoKey(u8),

    #[error("missing initialisation vector")]
    MissingIv,

    #[error("invalid initialisation vector: {0}")]
    InvalidIv(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("key derivation failed")]
    Derivation,

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("message buffer too short to encrypt")]
    BufferTooShort,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
