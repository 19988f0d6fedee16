use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::errors::{CryptoError, CryptoResult};
use crate::methods::EncryptionMethod;

/// Truncated length of keyring identifiers.
const KEY_ID_BYTES: usize = 12;

/// Derives the 32-byte message key for an encrypting method:
/// `HKDF-SHA-256(ikm = secret, salt = method salt, info = originator binary
/// address)`.
pub fn derive_key(
    method: EncryptionMethod,
    ikm: &[u8],
    originator_binary_address: &[u8],
) -> CryptoResult<Zeroizing<[u8; 32]>> {
    let salt = method
        .salt()
        .ok_or_else(|| CryptoError::NoKey(method.indicator()))?;
    hkdf_expand(salt, ikm, originator_binary_address)
}

pub(crate) fn hkdf_expand(
    salt: &[u8],
    ikm: &[u8],
    info: &[u8],
) -> CryptoResult<Zeroizing<[u8; 32]>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(info, okm.as_mut())
        .map_err(|_| CryptoError::Derivation)?;
    Ok(okm)
}

/// Keyring identifier for a key shared between two addresses on one
/// blockchain: `sha256(blockchain ‖ first ‖ second)` truncated to 12 bytes.
/// The address order encodes the direction; swapping the addresses yields a
/// different id.
pub fn key_id(blockchain: &str, first_address: &str, second_address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(blockchain.as_bytes());
    hasher.update(wf_utils::normalize_hex(first_address).as_bytes());
    hasher.update(wf_utils::normalize_hex(second_address).as_bytes());
    hex::encode(&hasher.finalize()[..KEY_ID_BYTES])
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "007a0baf6f84f0fa7402ea972686e56d50b707c9b67b108866";
    const PSK: &str = "32676187ba7badda85ea63a69870a7133909f1999774abb2eed251073616a6e7";

    #[test]
    fn derivation_is_deterministic() {
        let ikm = hex::decode(PSK).unwrap();
        let address = hex::decode(ADDRESS).unwrap();
        let a = derive_key(EncryptionMethod::PskAesCtr, &ikm, &address).unwrap();
        let b = derive_key(EncryptionMethod::PskAesCtr, &ikm, &address).unwrap();
        assert_eq!(a.as_ref(), b.as_ref());
    }

    #[test]
    fn methods_derive_different_keys() {
        let ikm = hex::decode(PSK).unwrap();
        let address = hex::decode(ADDRESS).unwrap();
        let m1 = derive_key(EncryptionMethod::EcdhAesCtr, &ikm, &address).unwrap();
        let m2 = derive_key(EncryptionMethod::PskAesCtr, &ikm, &address).unwrap();
        assert_ne!(m1.as_ref(), m2.as_ref());
    }

    #[test]
    fn no_encryption_has_no_key() {
        let result = derive_key(EncryptionMethod::NoEncryption, &[1, 2, 3], &[4, 5, 6]);
        assert!(matches!(result, Err(CryptoError::NoKey(0))));
    }

    #[test]
    fn key_id_depends_on_address_order() {
        let ab = key_id("ethereum", "aa01", "bb02");
        let ba = key_id("ethereum", "bb02", "aa01");
        assert_ne!(ab, ba);
        assert_eq!(ab.len(), KEY_ID_BYTES * 2);
    }

    #[test]
    fn key_id_normalizes_addresses() {
        assert_eq!(
            key_id("ethereum", "0xAA01", "bb02"),
            key_id("ethereum", "aa01", "BB02")
        );
    }
}
