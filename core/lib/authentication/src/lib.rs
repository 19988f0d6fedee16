//! Originator authentication. Incoming messages are authenticated against
//! the A-type messages their originator published earlier: a signed payload
//! at a URL (method 1) or a shared-token digest (method 2). Outgoing
//! authentication payloads are signed by the blockchain adapter; the core
//! only composes and decomposes the compact JWS form.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use wf_blockchain::{BlockchainRegistry, JwsSignature, SignaturePayload};
use wf_crypto::AuthToken;
use wf_protocol::{
    MessageBody, ProtocolError, WfErrorCode, WhiteflagMessage,
};
use wf_retrieval::Retriever;
use wf_state::{KeyCategory, StateManager};

/// A signed authentication payload: the compact JWS plus its decoded parts.
#[derive(Debug, Clone)]
pub struct SignedAuthentication {
    pub jws: JwsSignature,
    pub compact: String,
    pub protected: serde_json::Value,
    pub payload: serde_json::Value,
}

pub struct Authenticator {
    retriever: Arc<Retriever>,
    blockchains: Arc<BlockchainRegistry>,
    state: Arc<StateManager>,
    http: reqwest::Client,
}

impl Authenticator {
    pub fn new(
        retriever: Arc<Retriever>,
        blockchains: Arc<BlockchainRegistry>,
        state: Arc<StateManager>,
    ) -> Self {
        Self {
            retriever,
            blockchains,
            state,
            http: reqwest::Client::new(),
        }
    }

    fn auth_error(message: &WhiteflagMessage, cause: String) -> ProtocolError {
        ProtocolError::with_causes(
            WfErrorCode::AuthError,
            format!("originator verification failed for {}", message.log_context()),
            vec![cause],
        )
    }

    /// Verifies the originator of an incoming message against their stored
    /// authentication messages and sets `MetaHeader.originatorValid`.
    pub async fn verify_originator(
        &self,
        message: &mut WhiteflagMessage,
    ) -> Result<(), ProtocolError> {
        let Some(address) = message.meta_header.originator_address.clone() else {
            message.meta_header.originator_valid = Some(false);
            return Err(Self::auth_error(
                message,
                "message has no originator address".to_string(),
            ));
        };
        let blockchain = message.meta_header.blockchain.clone();

        let auth_messages = self
            .retriever
            .get_auth_messages(&address, Some(&blockchain))
            .await
            .map_err(|err| {
                message.meta_header.originator_valid = Some(false);
                Self::auth_error(message, err.to_string())
            })?;

        for auth_message in &auth_messages {
            let Some(MessageBody::Authentication(auth)) = &auth_message.message_body else {
                continue;
            };
            let verified = match auth.verification_method.as_str() {
                "1" => {
                    self.verify_url_method(&auth.verification_data, &address, &blockchain, message)
                        .await
                }
                "2" => {
                    self.verify_token_method(&auth.verification_data, &address, &blockchain)
                        .await
                }
                other => {
                    tracing::debug!("unknown verification method {other} in {}", auth_message.log_context());
                    Ok(false)
                }
            };
            match verified {
                Ok(true) => {
                    message.meta_header.originator_valid = Some(true);
                    if let Some(mut originator) = self.state.get_originator(&address).await {
                        if !originator.authenticated {
                            originator.authenticated = true;
                            self.state.upsert_originator(originator).await;
                        }
                    }
                    return Ok(());
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::debug!(
                        "authentication attempt failed for {}: {err}",
                        message.log_context()
                    );
                }
            }
        }

        message.meta_header.originator_valid = Some(false);
        Err(Self::auth_error(
            message,
            format!("originator {address} could not be authenticated"),
        ))
    }

    /// Method 1: the verification data is a URL hosting a JWS over the
    /// authentication payload.
    async fn verify_url_method(
        &self,
        url: &str,
        address: &str,
        blockchain: &str,
        message: &WhiteflagMessage,
    ) -> Result<bool, ProtocolError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| {
                Self::auth_error(
                    message,
                    format!("cannot retrieve signature from {}: {err}", wf_utils::scrub_credentials(url)),
                )
            })?;
        let jws: JwsSignature = response.json().await.map_err(|err| {
            Self::auth_error(message, format!("signature at {url} is malformed: {err}"))
        })?;

        let pubkey = message
            .meta_header
            .originator_pub_key
            .clone()
            .or(self
                .state
                .get_originator(address)
                .await
                .and_then(|originator| originator.pubkey));
        let Some(pubkey) = pubkey else {
            return Err(Self::auth_error(
                message,
                format!("no public key known for originator {address}"),
            ));
        };

        self.verify_jws(&jws, address, blockchain, &pubkey)
            .await
            .map_err(|err| Self::auth_error(message, err))
    }

    /// Signature and payload check for a fetched JWS. Signature scheme
    /// verification is delegated to the blockchain adapter; here the payload
    /// address is compared binary-equal with the originator address.
    async fn verify_jws(
        &self,
        jws: &JwsSignature,
        address: &str,
        blockchain: &str,
        pubkey: &str,
    ) -> Result<bool, String> {
        let adapter = self.blockchains.get(blockchain).map_err(|err| err.to_string())?;
        if !adapter
            .verify_signature(jws, pubkey)
            .await
            .map_err(|err| err.to_string())?
        {
            return Ok(false);
        }

        let payload_json = URL_SAFE_NO_PAD
            .decode(&jws.payload)
            .map_err(|err| format!("payload is not base64url: {err}"))?;
        let payload: SignaturePayload = serde_json::from_slice(&payload_json)
            .map_err(|err| format!("payload is not an authentication payload: {err}"))?;

        let expected = adapter
            .get_binary_address(address)
            .await
            .map_err(|err| err.to_string())?;
        let signed = adapter
            .get_binary_address(&payload.addr)
            .await
            .map_err(|err| err.to_string())?;
        Ok(expected == signed)
    }

    /// Method 2: the verification data is the HKDF digest of a shared
    /// authentication token and the originator's binary address.
    async fn verify_token_method(
        &self,
        verification_data: &str,
        address: &str,
        blockchain: &str,
    ) -> Result<bool, ProtocolError> {
        let adapter = self
            .blockchains
            .get(blockchain)
            .map_err(|err| ProtocolError::new(WfErrorCode::AuthError, err.to_string()))?;
        let binary_address = adapter.get_binary_address(address).await.map_err(|err| {
            ProtocolError::new(WfErrorCode::AuthError, format!("invalid address: {err}"))
        })?;

        for token_id in self.state.key_ids(KeyCategory::AuthTokens).await {
            let Some(secret) = self.state.get_key(KeyCategory::AuthTokens, &token_id).await
            else {
                continue;
            };
            let token = AuthToken::new(secret.to_vec());
            let derived = token.verification_data(&binary_address).map_err(|err| {
                ProtocolError::new(WfErrorCode::AuthError, format!("token derivation: {err}"))
            })?;
            if derived == wf_utils::normalize_hex(verification_data) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Signs an authentication payload for one of our accounts. The adapter
    /// produces the signature; the result carries both the compact form and
    /// the decoded parts.
    pub async fn sign(
        &self,
        blockchain: &str,
        address: &str,
        payload: SignaturePayload,
    ) -> Result<SignedAuthentication, wf_protocol::ProcessingError> {
        let adapter = self.blockchains.get(blockchain)?;
        let jws = adapter
            .request_signature(&payload, address)
            .await
            .map_err(|err| {
                wf_protocol::ProcessingError::new(
                    WfErrorCode::AuthError,
                    format!("cannot sign authentication payload: {err}"),
                )
            })?;

        let decode_part = |part: &str| -> serde_json::Value {
            URL_SAFE_NO_PAD
                .decode(part)
                .ok()
                .and_then(|raw| serde_json::from_slice(&raw).ok())
                .unwrap_or(serde_json::Value::Null)
        };

        Ok(SignedAuthentication {
            compact: jws.compact(),
            protected: decode_part(&jws.protected),
            payload: decode_part(&jws.payload),
            jws,
        })
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator").finish_non_exhaustive()
    }
}
