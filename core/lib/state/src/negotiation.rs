//! Key negotiation glue: ECDH keypairs live in the keyring under the
//! account id; a completed negotiation stores the shared secret as the
//! negotiated key for the address pair, ready for encryption method 1.

use wf_crypto::{key_id, CryptoError, CryptoResult, EcdhKeypair};
use zeroize::Zeroizing;

use crate::keyring::KeyCategory;
use crate::manager::StateManager;

impl StateManager {
    /// Creates an ECDH keypair for the account, replacing any previous one,
    /// and returns the compressed public key for the counterparty.
    pub async fn create_ecdh_keypair(&self, account_id: &str) -> String {
        let keypair = EcdhKeypair::generate();
        self.upsert_key(
            KeyCategory::EcdhPrivateKeys,
            account_id,
            keypair.secret_bytes().to_vec(),
        )
        .await;
        keypair.public_key_hex()
    }

    /// The public key of the account's current ECDH keypair, if one exists.
    pub async fn ecdh_public_key(&self, account_id: &str) -> Option<String> {
        let secret = self.get_key(KeyCategory::EcdhPrivateKeys, account_id).await?;
        EcdhKeypair::from_secret_bytes(&secret)
            .ok()
            .map(|keypair| keypair.public_key_hex())
    }

    /// Computes the ECDH shared secret between the account's keypair and the
    /// counterparty's public key.
    pub async fn generate_ecdh_secret(
        &self,
        account_id: &str,
        other_public_key_hex: &str,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        let secret = self
            .get_key(KeyCategory::EcdhPrivateKeys, account_id)
            .await
            .ok_or_else(|| {
                CryptoError::InvalidKey(format!("no ECDH keypair for account {account_id}"))
            })?;
        let keypair = EcdhKeypair::from_secret_bytes(&secret)?;
        keypair.shared_secret(other_public_key_hex)
    }

    /// Completes a key negotiation: derives the shared secret and stores it
    /// as the negotiated key for the (own, other) address pair. Returns the
    /// keyring id the tx pipeline will find it under.
    pub async fn negotiate_key(
        &self,
        account_id: &str,
        other_public_key_hex: &str,
        blockchain: &str,
        own_address: &str,
        other_address: &str,
    ) -> CryptoResult<String> {
        let shared = self
            .generate_ecdh_secret(account_id, other_public_key_hex)
            .await?;
        let id = key_id(blockchain, own_address, other_address);
        self.upsert_key(KeyCategory::NegotiatedKeys, &id, shared.to_vec())
            .await;
        Ok(id)
    }
}
