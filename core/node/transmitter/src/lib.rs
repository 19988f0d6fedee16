//! The tx pipeline: verify-metadata → verify-reference → encode → send →
//! complete. A message traverses the stages strictly in order; concurrent
//! messages are independent. Stage transitions are observable on the tx
//! event channel.

mod metrics;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use wf_blockchain::BlockchainRegistry;
use wf_config::ProtocolConfig;
use wf_crypto::{derive_key, key_id, EncryptionMethod, WfCipher};
use wf_events::{Channel, EventBus, EventKind};
use wf_protocol::{
    CryptoBody, MessageBody, MessageCode, MessageHeader, ProcessingError, TransceiveDirection,
    WfErrorCode, WhiteflagMessage,
};
use wf_references::{ReferenceCheckError, ReferenceValidator};
use wf_state::{KeyCategory, StateManager};
use zeroize::Zeroizing;

use crate::metrics::METRICS;

/// Delay before the single retry of a failed auto-generated send.
const RETRY_DELAY: Duration = Duration::from_secs(20);

struct TransmitterInner {
    config: ProtocolConfig,
    state: Arc<StateManager>,
    blockchains: Arc<BlockchainRegistry>,
    references: Arc<ReferenceValidator>,
    events: Arc<EventBus>,
}

/// Handle to the tx pipeline. Clones share the same pipeline; spawned retry
/// and announcement tasks hold their own clone.
#[derive(Clone)]
pub struct Transmitter {
    inner: Arc<TransmitterInner>,
}

impl Transmitter {
    pub fn new(
        config: ProtocolConfig,
        state: Arc<StateManager>,
        blockchains: Arc<BlockchainRegistry>,
        references: Arc<ReferenceValidator>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(TransmitterInner {
                config,
                state,
                blockchains,
                references,
                events,
            }),
        }
    }

    /// Runs a client message through the tx pipeline. The returned message
    /// carries the transaction hash on success; no partial success exists.
    pub async fn send(
        &self,
        message: WhiteflagMessage,
    ) -> Result<WhiteflagMessage, ProcessingError> {
        self.send_inner(message, true).await
    }

    async fn send_inner(
        &self,
        mut message: WhiteflagMessage,
        allow_retry: bool,
    ) -> Result<WhiteflagMessage, ProcessingError> {
        self.inner.events
            .emit(Channel::Tx, EventKind::MessageCommitted, &message);

        let result = self.run_stages(&mut message, allow_retry).await;
        match result {
            Ok(()) => {
                self.inner.events
                    .emit(Channel::Tx, EventKind::MessageProcessed, &message);
                METRICS.messages_processed.inc();
                self.announce_init_vector(&message);
                Ok(message)
            }
            Err(err) => {
                METRICS.messages_failed.inc();
                tracing::error!(
                    "tx pipeline failed for {}: {err}",
                    message.log_context()
                );
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        message: &mut WhiteflagMessage,
        allow_retry: bool,
    ) -> Result<(), ProcessingError> {
        self.verify_metadata(message)?;
        self.verify_reference(message).await?;
        self.encode(message).await?;
        self.dispatch(message, allow_retry).await
    }

    /// Stage 1: metadata. An outgoing message needs a blockchain and an
    /// originator address; the direction is assigned here, exactly once.
    fn verify_metadata(&self, message: &mut WhiteflagMessage) -> Result<(), ProcessingError> {
        if message.meta_header.blockchain.is_empty() {
            return Err(ProcessingError::new(
                WfErrorCode::MetaheaderError,
                "no blockchain specified",
            ));
        }
        if message
            .meta_header
            .originator_address
            .as_deref()
            .unwrap_or("")
            .is_empty()
        {
            return Err(ProcessingError::new(
                WfErrorCode::MetaheaderError,
                "no originator address specified",
            ));
        }
        message.meta_header.set_direction(TransceiveDirection::Tx)?;
        self.inner.events
            .emit(Channel::Tx, EventKind::MetadataVerified, message);
        Ok(())
    }

    /// Stage 2: reference verification. Protocol violations are fatal for
    /// an outgoing message; transient lookup failures are logged and
    /// skipped.
    async fn verify_reference(
        &self,
        message: &mut WhiteflagMessage,
    ) -> Result<(), ProcessingError> {
        if !self.inner.config.tx.verify_reference || message.meta_header.auto_generated {
            self.inner.events
                .emit(Channel::Tx, EventKind::ReferenceSkipped, message);
            return Ok(());
        }
        match self.inner.references.verify_reference(message).await {
            Ok(()) => {
                self.inner.events
                    .emit(Channel::Tx, EventKind::ReferenceVerified, message);
                Ok(())
            }
            Err(ReferenceCheckError::Protocol(err)) => Err(err.into()),
            Err(ReferenceCheckError::Lookup(err)) => {
                tracing::warn!(
                    "cannot verify reference of {}: {err}",
                    message.log_context()
                );
                self.inner.events
                    .emit(Channel::Tx, EventKind::ReferenceSkipped, message);
                Ok(())
            }
        }
    }

    /// Stage 3: format verification, binary encoding and encryption.
    async fn encode(&self, message: &mut WhiteflagMessage) -> Result<(), ProcessingError> {
        if let Err(err) = wf_protocol::verify_format(message) {
            message.meta_header.format_valid = Some(false);
            return Err(err.into());
        }
        message.meta_header.format_valid = Some(true);

        let (Some(header), Some(body)) = (&message.message_header, &message.message_body) else {
            return Err(ProcessingError::new(
                WfErrorCode::FormatError,
                "message has no header or body",
            ));
        };
        let mut buffer = wf_protocol::encode(header, body).map_err(|err| {
            ProcessingError::new(WfErrorCode::FormatError, format!("cannot encode: {err}"))
        })?;

        let method_digit = header.encryption_method().unwrap_or(u8::MAX);
        let method = EncryptionMethod::from_indicator(method_digit).map_err(|err| {
            ProcessingError::new(WfErrorCode::EncryptionError, err.to_string())
        })?;
        if method.is_encrypted() {
            let key = self.select_encryption_key(message, method).await?;
            let mut cipher = WfCipher::from_key(key);
            let iv = cipher.generate_iv();
            cipher.process(&mut buffer).map_err(|err| {
                ProcessingError::new(WfErrorCode::EncryptionError, err.to_string())
            })?;
            message.meta_header.encryption_init_vector = Some(hex::encode(iv));
        }

        message.meta_header.encoded_message = Some(hex::encode(&buffer));
        self.inner.events
            .emit(Channel::Tx, EventKind::MessageEncoded, message);
        Ok(())
    }

    /// IKM selection for an outgoing message, in order: message-local key
    /// input (method 2), keyring entry for the address pair, configured PSK
    /// fallback (method 2).
    async fn select_encryption_key(
        &self,
        message: &mut WhiteflagMessage,
        method: EncryptionMethod,
    ) -> Result<Zeroizing<[u8; 32]>, ProcessingError> {
        let blockchain = message.meta_header.blockchain.clone();
        let originator = message
            .meta_header
            .originator_address
            .clone()
            .unwrap_or_default();

        let no_key = || {
            ProcessingError::new(
                WfErrorCode::EncryptionError,
                format!("no encryption key available for method {}", method.indicator()),
            )
        };

        // The key input is transient: used once, then dropped.
        let ikm: Zeroizing<Vec<u8>> =
            if let Some(key_input) = message.meta_header.encryption_key_input.take() {
                if method != EncryptionMethod::PskAesCtr {
                    return Err(ProcessingError::new(
                        WfErrorCode::EncryptionError,
                        "message-local key input is only valid for method 2",
                    ));
                }
                Zeroizing::new(wf_utils::decode_hex(&key_input).map_err(|err| {
                    ProcessingError::new(
                        WfErrorCode::EncryptionError,
                        format!("invalid key input: {err}"),
                    )
                })?)
            } else {
                let keyring_entry = match (&message.meta_header.recipient_address, method) {
                    (Some(recipient), EncryptionMethod::EcdhAesCtr) => {
                        let id = key_id(&blockchain, &originator, recipient);
                        self.inner.state.get_key(KeyCategory::NegotiatedKeys, &id).await
                    }
                    (Some(recipient), EncryptionMethod::PskAesCtr) => {
                        let id = key_id(&blockchain, recipient, &originator);
                        self.inner.state.get_key(KeyCategory::PresharedKeys, &id).await
                    }
                    _ => None,
                };
                match (keyring_entry, method) {
                    (Some(secret), _) => secret,
                    (None, EncryptionMethod::PskAesCtr) => {
                        let psk = self.inner.config.encryption.psk.as_ref().ok_or_else(no_key)?;
                        Zeroizing::new(wf_utils::decode_hex(psk).map_err(|err| {
                            ProcessingError::new(
                                WfErrorCode::EncryptionError,
                                format!("invalid configured pre-shared key: {err}"),
                            )
                        })?)
                    }
                    (None, _) => return Err(no_key()),
                }
            };

        let adapter = self.inner.blockchains.get(&blockchain)?;
        let binary_address = adapter.get_binary_address(&originator).await.map_err(|err| {
            ProcessingError::new(
                WfErrorCode::EncryptionError,
                format!("cannot resolve binary address: {err}"),
            )
        })?;

        derive_key(method, &ikm, &binary_address)
            .map_err(|err| ProcessingError::new(WfErrorCode::EncryptionError, err.to_string()))
    }

    /// Stage 4: hand off to the blockchain adapter. A failed send of an
    /// auto-generated message is retried once after [`RETRY_DELAY`].
    async fn dispatch(
        &self,
        message: &mut WhiteflagMessage,
        allow_retry: bool,
    ) -> Result<(), ProcessingError> {
        if self.inner.config.tx.test_messages_only && message.code() != Some(MessageCode::Test) {
            return Err(ProcessingError::new(
                WfErrorCode::NotAllowed,
                "only test messages may be sent",
            ));
        }

        let adapter = self.inner.blockchains.get(&message.meta_header.blockchain)?;
        match adapter.send_message(message).await {
            Ok(receipt) => {
                message.meta_header.transaction_hash =
                    Some(wf_utils::normalize_hex(&receipt.transaction_hash));
                message.meta_header.block_number = receipt.block_number;
                message.meta_header.transmission_success = Some(true);
                if message.meta_header.transaction_time.is_none() {
                    message.meta_header.transaction_time = Some(wf_utils::iso8601_now());
                }
                self.inner.events
                    .emit(Channel::Tx, EventKind::MessageSent, message);
                Ok(())
            }
            Err(err) => {
                METRICS.send_failures.inc();
                if allow_retry
                    && message.meta_header.auto_generated
                    && message.meta_header.transmission_success != Some(true)
                {
                    self.schedule_retry(message.clone());
                }
                Err(ProcessingError::new(
                    WfErrorCode::NotAvailable,
                    format!("cannot send message: {err}"),
                ))
            }
        }
    }

    fn schedule_retry(&self, mut message: WhiteflagMessage) {
        METRICS.retries_scheduled.inc();
        tracing::warn!(
            "send of auto-generated {} failed, retrying in {}s",
            message.log_context(),
            RETRY_DELAY.as_secs()
        );
        // The retried message re-enters the full pipeline; reset what the
        // first pass produced.
        message.meta_header.encoded_message = None;
        message.meta_header.encryption_init_vector = None;
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RETRY_DELAY).await;
            if let Err(err) = this.send_inner(message, false).await {
                tracing::error!("retry failed: {err}");
            }
        });
    }

    /// After an encrypted message is sent, its IV travels out-of-band: an
    /// auto-generated K message referencing the transaction, with the IV as
    /// crypto data.
    fn announce_init_vector(&self, message: &WhiteflagMessage) {
        let method = message
            .message_header
            .as_ref()
            .and_then(|header| header.encryption_method());
        let crypto_data_type = match method {
            Some(1) => "11",
            Some(2) => "21",
            _ => return,
        };
        let (Some(iv), Some(hash)) = (
            message.meta_header.encryption_init_vector.clone(),
            message.meta_header.transaction_hash.clone(),
        ) else {
            return;
        };

        let mut header = MessageHeader::original(MessageCode::Crypto);
        header.reference_indicator = "3".to_string();
        header.referenced_message = hash;
        let mut announcement = WhiteflagMessage::new(
            message.meta_header.blockchain.clone(),
            header,
            MessageBody::Crypto(CryptoBody {
                crypto_data_type: crypto_data_type.to_string(),
                crypto_data: iv,
            }),
        );
        announcement.meta_header.originator_address =
            message.meta_header.originator_address.clone();
        announcement.meta_header.recipient_address = message.meta_header.recipient_address.clone();
        announcement.meta_header.auto_generated = true;

        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.send(announcement).await {
                tracing::error!("cannot announce initialisation vector: {err}");
            }
        });
    }
}

impl std::fmt::Debug for Transmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmitter").finish_non_exhaustive()
    }
}
