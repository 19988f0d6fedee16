use const_decoder::Decoder;
use zeroize::Zeroizing;

use crate::errors::{CryptoError, CryptoResult};
use crate::keys::hkdf_expand;

/// Fixed HKDF salt for authentication token verification data.
const AUTH_TOKEN_SALT: [u8; 32] =
    Decoder::Hex.decode(b"420abc48f5d69328c457d61725d3fd7af2883cad8460976167e375b9f2c14081");

/// A shared secret authentication token (verification method 2).
pub struct AuthToken {
    secret: Zeroizing<Vec<u8>>,
}

impl AuthToken {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret: Zeroizing::new(secret),
        }
    }

    pub fn from_hex(secret_hex: &str) -> CryptoResult<Self> {
        let secret = wf_utils::decode_hex(secret_hex)
            .map_err(|err| CryptoError::InvalidKey(err.to_string()))?;
        Ok(Self::new(secret))
    }

    /// The verification data published in an A2 message for the originator
    /// with the given binary address:
    /// `HKDF-SHA-256(token, auth salt, binary address, 32)`, hex-encoded.
    pub fn verification_data(&self, binary_address: &[u8]) -> CryptoResult<String> {
        let okm = hkdf_expand(&AUTH_TOKEN_SALT, &self.secret, binary_address)?;
        Ok(hex::encode(okm.as_ref()))
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken").finish_non_exhaustive()
    }
}
