//! The rx pipeline: verify-metadata → decode (with IV pairing and key
//! search) → verify-originator → verify-reference → complete. Protocol
//! violations on incoming messages are normally downgraded to warnings on
//! the message's `validationErrors`; only undecodable or unauthenticated
//! (under strict auth) messages fail the pipeline.

mod metrics;
#[cfg(test)]
mod tests;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use wf_authentication::Authenticator;
use wf_blockchain::{BlockchainRegistry, RawTransaction};
use wf_config::ProtocolConfig;
use wf_crypto::{derive_key, key_id, EncryptionMethod, WfCipher};
use wf_events::{Channel, EventBus, EventKind};
use wf_protocol::{
    MessageBody, MessageCode, MessageHeader, MetaHeader, ProcessingError, TransceiveDirection,
    WfErrorCode, WhiteflagMessage,
};
use wf_references::{ReferenceCheckError, ReferenceValidator};
use wf_retrieval::Retriever;
use wf_state::{InitVectorEntry, KeyCategory, StateManager};
use zeroize::Zeroizing;

use crate::metrics::METRICS;

/// K-message crypto data types announcing an initialisation vector.
const IV_ANNOUNCEMENT_TYPES: [&str; 2] = ["11", "21"];

struct ReceiverInner {
    config: ProtocolConfig,
    state: Arc<StateManager>,
    blockchains: Arc<BlockchainRegistry>,
    authenticator: Arc<Authenticator>,
    references: Arc<ReferenceValidator>,
    retriever: Arc<Retriever>,
    events: Arc<EventBus>,
}

/// Handle to the rx pipeline. Clones share the same pipeline; the re-entry
/// task after IV pairing holds its own clone.
#[derive(Clone)]
pub struct Receiver {
    inner: Arc<ReceiverInner>,
}

impl Receiver {
    pub fn new(
        config: ProtocolConfig,
        state: Arc<StateManager>,
        blockchains: Arc<BlockchainRegistry>,
        authenticator: Arc<Authenticator>,
        references: Arc<ReferenceValidator>,
        retriever: Arc<Retriever>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(ReceiverInner {
                config,
                state,
                blockchains,
                authenticator,
                references,
                retriever,
                events,
            }),
        }
    }

    /// Entry point for raw transaction data delivered by a blockchain
    /// adapter listener.
    pub async fn receive_raw(
        &self,
        blockchain: &str,
        raw: RawTransaction,
    ) -> Result<WhiteflagMessage, ProcessingError> {
        let meta = MetaHeader {
            blockchain: blockchain.to_string(),
            transaction_hash: Some(raw.transaction_hash),
            block_number: raw.block_number,
            transaction_time: raw.transaction_time,
            originator_address: Some(raw.originator_address),
            originator_pub_key: raw.originator_pub_key,
            recipient_address: raw.recipient_address,
            encoded_message: Some(raw.encoded_message),
            ..MetaHeader::default()
        };
        self.receive(WhiteflagMessage::undecoded(meta)).await
    }

    /// Runs an incoming message through the rx pipeline.
    pub fn receive(
        &self,
        mut message: WhiteflagMessage,
    ) -> Pin<Box<dyn Future<Output = Result<WhiteflagMessage, ProcessingError>> + Send + '_>> {
        Box::pin(async move {
            self.inner.events
                .emit(Channel::Rx, EventKind::MessageReceived, &message);

            let result = self.run_stages(&mut message).await;
            match result {
                Ok(completed) => {
                    if completed {
                        self.inner.events
                            .emit(Channel::Rx, EventKind::MessageProcessed, &message);
                        METRICS.messages_processed.inc();
                    }
                    Ok(message)
                }
                Err(err) => {
                    METRICS.messages_failed.inc();
                    tracing::error!("rx pipeline failed for {}: {err}", message.log_context());
                    Err(err)
                }
            }
        })
    }

    /// Returns `Ok(false)` when the message was emitted early (encrypted,
    /// no IV available) and the remaining stages do not apply.
    async fn run_stages(
        &self,
        message: &mut WhiteflagMessage,
    ) -> Result<bool, ProcessingError> {
        self.verify_metadata(message)?;
        if !self.decode(message).await? {
            // Kept encrypted until the matching K-message arrives.
            self.inner.events
                .emit(Channel::Rx, EventKind::MessageProcessed, message);
            METRICS.messages_held_encrypted.inc();
            return Ok(false);
        }
        self.handle_iv_announcement(message).await;
        self.verify_originator(message).await?;
        self.verify_reference(message).await?;
        Ok(true)
    }

    /// Stage 1: metadata. Hash and encoded message are required and
    /// normalised to lowercase hex without prefix.
    fn verify_metadata(&self, message: &mut WhiteflagMessage) -> Result<(), ProcessingError> {
        if message.meta_header.blockchain.is_empty() {
            return Err(ProcessingError::new(
                WfErrorCode::MetaheaderError,
                "no blockchain specified",
            ));
        }
        let hash = message.meta_header.transaction_hash.as_deref().unwrap_or("");
        if hash.is_empty() {
            return Err(ProcessingError::new(
                WfErrorCode::MetaheaderError,
                "no transaction hash",
            ));
        }
        let encoded = message.meta_header.encoded_message.as_deref().unwrap_or("");
        if encoded.is_empty() {
            return Err(ProcessingError::new(
                WfErrorCode::MetaheaderError,
                "no encoded message",
            ));
        }
        message.meta_header.transaction_hash = Some(wf_utils::normalize_hex(hash));
        message.meta_header.encoded_message = Some(wf_utils::normalize_hex(encoded));
        message.meta_header.set_direction(TransceiveDirection::Rx)?;
        if message.meta_header.transaction_time.is_none() {
            message.meta_header.transaction_time = Some(wf_utils::iso8601_now());
        }
        self.inner.events
            .emit(Channel::Rx, EventKind::MetadataVerified, message);
        Ok(())
    }

    /// Stage 2: decode, decrypting first where needed. Returns `Ok(false)`
    /// if the message must be held encrypted for lack of an IV.
    async fn decode(&self, message: &mut WhiteflagMessage) -> Result<bool, ProcessingError> {
        let encoded_hex = message.meta_header.encoded_message.clone().unwrap_or_default();
        let encoded = wf_utils::decode_hex(&encoded_hex).map_err(|err| {
            ProcessingError::new(
                WfErrorCode::FormatError,
                format!("encoded message is not hex: {err}"),
            )
        })?;
        let indicator = wf_protocol::encryption_indicator(&encoded).map_err(|err| {
            ProcessingError::new(WfErrorCode::FormatError, err.to_string())
        })?;
        let method = EncryptionMethod::from_indicator(indicator).map_err(|err| {
            ProcessingError::new(WfErrorCode::EncryptionError, err.to_string())
        })?;

        let (header, body) = if !method.is_encrypted() {
            wf_protocol::decode(&encoded).map_err(|err| {
                ProcessingError::new(
                    WfErrorCode::FormatError,
                    format!("cannot decode message: {err}"),
                )
            })?
        } else {
            let hash = message.meta_header.transaction_hash.clone().unwrap_or_default();
            let iv_hex = match message.meta_header.encryption_init_vector.clone() {
                Some(iv) => Some(iv),
                None => match self.inner.state.take_init_vector(&hash).await {
                    Some(entry) => {
                        message.meta_header.encryption_init_vector =
                            Some(entry.init_vector.clone());
                        Some(entry.init_vector)
                    }
                    None => None,
                },
            };
            let Some(iv_hex) = iv_hex else {
                tracing::info!(
                    "holding encrypted message {} until its IV arrives",
                    message.log_context()
                );
                return Ok(false);
            };
            self.decrypt_and_decode(message, method, &encoded, &iv_hex)
                .await?
        };

        message.message_header = Some(header);
        message.message_body = Some(body);

        match wf_protocol::verify_format(message) {
            Ok(()) => message.meta_header.format_valid = Some(true),
            Err(err) => {
                // Structural violations on an incoming message are recorded,
                // not fatal.
                message.meta_header.format_valid = Some(false);
                for warning in err.into_warnings() {
                    message.meta_header.add_validation_error(warning);
                }
            }
        }

        self.inner.events
            .emit(Channel::Rx, EventKind::MessageDecoded, message);
        METRICS.messages_decoded.inc();
        Ok(true)
    }

    /// Key search for an encrypted incoming message: the message-local key
    /// input first, then each candidate recipient's keyring entry, then the
    /// configured PSK. The recipient that decrypts is recorded.
    async fn decrypt_and_decode(
        &self,
        message: &mut WhiteflagMessage,
        method: EncryptionMethod,
        encoded: &[u8],
        iv_hex: &str,
    ) -> Result<(MessageHeader, MessageBody), ProcessingError> {
        let blockchain = message.meta_header.blockchain.clone();
        let originator = message
            .meta_header
            .originator_address
            .clone()
            .unwrap_or_default();
        let adapter = self.inner.blockchains.get(&blockchain)?;
        let binary_address = adapter.get_binary_address(&originator).await.map_err(|err| {
            ProcessingError::new(
                WfErrorCode::EncryptionError,
                format!("cannot resolve binary address: {err}"),
            )
        })?;

        // Candidate IKMs, each with the recipient address it belongs to.
        let mut candidates: Vec<(Zeroizing<Vec<u8>>, Option<String>)> = Vec::new();

        if let Some(key_input) = message.meta_header.encryption_key_input.take() {
            if let Ok(ikm) = wf_utils::decode_hex(&key_input) {
                candidates.push((Zeroizing::new(ikm), None));
            }
        }

        let recipients: Vec<String> = match &message.meta_header.recipient_address {
            Some(recipient) => vec![recipient.clone()],
            None => self.inner
                .state
                .get_accounts(&blockchain)
                .await
                .into_iter()
                .map(|account| account.address)
                .collect(),
        };
        for recipient in recipients {
            // As the recipient, the key id order is swapped relative to the
            // sender's.
            let (category, id) = match method {
                EncryptionMethod::EcdhAesCtr => (
                    KeyCategory::NegotiatedKeys,
                    key_id(&blockchain, &recipient, &originator),
                ),
                _ => (
                    KeyCategory::PresharedKeys,
                    key_id(&blockchain, &originator, &recipient),
                ),
            };
            if let Some(secret) = self.inner.state.get_key(category, &id).await {
                candidates.push((secret, Some(recipient)));
            }
        }

        if method == EncryptionMethod::PskAesCtr {
            if let Some(psk) = &self.inner.config.encryption.psk {
                if let Ok(ikm) = wf_utils::decode_hex(psk) {
                    candidates.push((Zeroizing::new(ikm), None));
                }
            }
        }

        for (ikm, recipient) in candidates {
            let key = match derive_key(method, &ikm, &binary_address) {
                Ok(key) => key,
                Err(err) => {
                    tracing::debug!("key derivation failed: {err}");
                    continue;
                }
            };
            let cipher = match WfCipher::from_key(key).with_iv_hex(iv_hex) {
                Ok(cipher) => cipher,
                Err(err) => {
                    return Err(ProcessingError::new(
                        WfErrorCode::EncryptionError,
                        err.to_string(),
                    ))
                }
            };
            let mut buffer = encoded.to_vec();
            if cipher.process(&mut buffer).is_err() {
                continue;
            }
            if let Ok((header, body)) = wf_protocol::decode(&buffer) {
                if let Some(recipient) = recipient {
                    message.meta_header.recipient_address = Some(recipient);
                }
                return Ok((header, body));
            }
        }

        Err(ProcessingError::new(
            WfErrorCode::EncryptionError,
            format!("cannot decrypt message {}", message.log_context()),
        ))
    }

    /// A decoded K-message of sub-type 11/21 carries the IV of an earlier
    /// encrypted message. If that ciphertext is already stored, it re-enters
    /// the pipeline with the IV attached; otherwise the IV waits in the
    /// queue.
    async fn handle_iv_announcement(&self, message: &WhiteflagMessage) {
        let Some(MessageBody::Crypto(body)) = &message.message_body else {
            return;
        };
        let Some(header) = &message.message_header else {
            return;
        };
        if !IV_ANNOUNCEMENT_TYPES.contains(&body.crypto_data_type.as_str())
            || header.reference_indicator != "3"
        {
            return;
        }

        let referenced = wf_utils::normalize_hex(&header.referenced_message);
        let blockchain = message.meta_header.blockchain.clone();
        // Trailing pad nibbles may stick to the crypto data; the IV is
        // exactly 16 bytes.
        let iv: String = body.crypto_data.chars().take(32).collect();

        let stored = self.inner
            .retriever
            .get_message(&referenced, Some(&blockchain))
            .await
            .unwrap_or_default();
        match stored.into_iter().find(|stored| !stored.is_decoded()) {
            Some(mut ciphertext) => {
                tracing::info!("pairing IV with held encrypted message {referenced}");
                ciphertext.meta_header.encryption_init_vector = Some(iv);
                let this = self.clone();
                tokio::spawn(async move {
                    if let Err(err) = this.receive(ciphertext).await {
                        tracing::error!("re-entry after IV pairing failed: {err}");
                    }
                });
            }
            None => {
                METRICS.ivs_queued.inc();
                self.inner.state
                    .upsert_init_vector(InitVectorEntry {
                        referenced_message: referenced,
                        init_vector: iv,
                    })
                    .await;
            }
        }
    }

    /// Stage 3: originator verification. A-type messages are
    /// self-authenticating. Failures are warnings unless strict
    /// authentication is configured.
    async fn verify_originator(
        &self,
        message: &mut WhiteflagMessage,
    ) -> Result<(), ProcessingError> {
        if !self.inner.config.rx.verify_originator || message.code() == Some(MessageCode::Authentication)
        {
            self.inner.events
                .emit(Channel::Rx, EventKind::OriginatorSkipped, message);
            return Ok(());
        }
        match self.inner.authenticator.verify_originator(message).await {
            Ok(()) => {
                self.inner.events
                    .emit(Channel::Rx, EventKind::OriginatorVerified, message);
                Ok(())
            }
            Err(err) if self.inner.config.authentication.strict => Err(err.into()),
            Err(err) => {
                for warning in err.into_warnings() {
                    message.meta_header.add_validation_error(warning);
                }
                Ok(())
            }
        }
    }

    /// Stage 4: reference verification. IV announcements skip it; failures
    /// are downgraded to warnings.
    async fn verify_reference(&self, message: &mut WhiteflagMessage) -> Result<(), ProcessingError> {
        let is_iv_announcement = matches!(
            (&message.message_header, &message.message_body),
            (Some(header), Some(MessageBody::Crypto(body)))
                if header.reference_indicator == "3"
                    && IV_ANNOUNCEMENT_TYPES.contains(&body.crypto_data_type.as_str())
        );
        if !self.inner.config.rx.verify_reference || is_iv_announcement {
            self.inner.events
                .emit(Channel::Rx, EventKind::ReferenceSkipped, message);
            return Ok(());
        }
        match self.inner.references.verify_reference(message).await {
            Ok(()) => {
                self.inner.events
                    .emit(Channel::Rx, EventKind::ReferenceVerified, message);
            }
            Err(ReferenceCheckError::Protocol(err)) => {
                for warning in err.into_warnings() {
                    message.meta_header.add_validation_error(warning);
                }
            }
            Err(ReferenceCheckError::Lookup(err)) => {
                tracing::warn!(
                    "cannot verify reference of {}: {err}",
                    message.log_context()
                );
                self.inner.events
                    .emit(Channel::Rx, EventKind::ReferenceSkipped, message);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver").finish_non_exhaustive()
    }
}
