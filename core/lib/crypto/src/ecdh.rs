//! ECDH key negotiation for encryption method 1. Public keys travel as
//! compressed SEC1 points in lowercase hex; the raw shared secret is the
//! input keying material for HKDF.

use k256::ecdh::diffie_hellman;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::errors::{CryptoError, CryptoResult};

pub struct EcdhKeypair {
    secret: SecretKey,
}

impl EcdhKeypair {
    /// Generates a fresh keypair. Creating a new keypair for an account id
    /// replaces the previous one; the old secret is wiped on drop.
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|err| CryptoError::InvalidKey(err.to_string()))?;
        Ok(Self { secret })
    }

    /// The secret scalar bytes for keyring storage.
    pub fn secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.secret.to_bytes().to_vec())
    }

    /// Own public key as a compressed SEC1 point, lowercase hex.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.secret.public_key().to_encoded_point(true).as_bytes())
    }

    /// Computes the shared secret with the other party's compressed public
    /// key. The result is input keying material, not a usable cipher key.
    pub fn shared_secret(&self, other_public_key_hex: &str) -> CryptoResult<Zeroizing<Vec<u8>>> {
        let bytes = wf_utils::decode_hex(other_public_key_hex)
            .map_err(|err| CryptoError::InvalidPublicKey(err.to_string()))?;
        let other = PublicKey::from_sec1_bytes(&bytes)
            .map_err(|err| CryptoError::InvalidPublicKey(err.to_string()))?;
        let shared = diffie_hellman(self.secret.to_nonzero_scalar(), other.as_affine());
        Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
    }
}

impl std::fmt::Debug for EcdhKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdhKeypair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}
