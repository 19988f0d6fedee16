use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::errors::{CryptoError, CryptoResult};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Initialisation vector size for the AES-CTR methods.
pub const IV_BYTE_LENGTH: usize = 16;

/// Number of leading message bytes that stay cleartext: prefix, version and
/// encryption indicator. The CTR keystream starts at byte 4 of the buffer.
pub const CLEARTEXT_BYTES: usize = 4;

/// A single-use AES-256-CTR cipher over an encoded message buffer.
///
/// Encryption and decryption are the same keystream application; the caller
/// decides the direction. The key is wiped when the cipher is dropped.
pub struct WfCipher {
    key: Zeroizing<[u8; 32]>,
    iv: Option<[u8; IV_BYTE_LENGTH]>,
}

impl WfCipher {
    /// Builds a cipher from a derived 32-byte key. Takes ownership so the
    /// only remaining copy of the key is inside the cipher.
    pub fn from_key(key: Zeroizing<[u8; 32]>) -> Self {
        Self { key, iv: None }
    }

    /// Sets the initialisation vector from its hex representation.
    pub fn with_iv_hex(mut self, iv_hex: &str) -> CryptoResult<Self> {
        let bytes = wf_utils::decode_hex(iv_hex)
            .map_err(|err| CryptoError::InvalidIv(err.to_string()))?;
        let iv: [u8; IV_BYTE_LENGTH] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| CryptoError::InvalidIv(format!("{} bytes", bytes.len())))?;
        self.iv = Some(iv);
        Ok(self)
    }

    pub fn with_iv(mut self, iv: [u8; IV_BYTE_LENGTH]) -> Self {
        self.iv = Some(iv);
        self
    }

    /// Generates a fresh random IV, keeps it and returns it for out-of-band
    /// transmission.
    pub fn generate_iv(&mut self) -> [u8; IV_BYTE_LENGTH] {
        let mut iv = [0u8; IV_BYTE_LENGTH];
        rand::thread_rng().fill_bytes(&mut iv);
        self.iv = Some(iv);
        iv
    }

    /// Applies the keystream to all bytes after the cleartext prefix,
    /// in place.
    pub fn process(&self, buffer: &mut [u8]) -> CryptoResult<()> {
        let iv = self.iv.ok_or(CryptoError::MissingIv)?;
        if buffer.len() < CLEARTEXT_BYTES {
            return Err(CryptoError::BufferTooShort);
        }
        let mut ctr = Aes256Ctr::new((&*self.key).into(), &iv.into());
        ctr.apply_keystream(&mut buffer[CLEARTEXT_BYTES..]);
        Ok(())
    }
}

impl std::fmt::Debug for WfCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WfCipher")
            .field("iv", &self.iv.map(hex::encode))
            .finish_non_exhaustive()
    }
}
