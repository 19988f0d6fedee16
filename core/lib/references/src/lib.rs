//! Reference validation: checks that a message's reference indicator and
//! referenced message respect the protocol's relation tables. The verdict is
//! deterministic for a given (message, referenced message) pair.

mod tables;

use std::sync::Arc;

use thiserror::Error;
use wf_protocol::{
    MessageCode, ProcessingError, ProtocolError, WfErrorCode, WhiteflagMessage, ZERO_REFERENCE,
};
use wf_retrieval::Retriever;

use crate::tables::{allowed_indicators, allowed_referenced_codes, policy};

/// Outcome of a failed reference check. Protocol violations are final for
/// the pair; lookup failures are transient and the pipelines decide whether
/// they matter.
#[derive(Debug, Error)]
pub enum ReferenceCheckError {
    #[error(transparent)]
    Protocol(ProtocolError),
    #[error(transparent)]
    Lookup(ProcessingError),
}

#[derive(Debug)]
pub struct ReferenceValidator {
    retriever: Arc<Retriever>,
}

impl ReferenceValidator {
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self { retriever }
    }

    fn violation(message: &WhiteflagMessage, cause: String) -> ReferenceCheckError {
        ReferenceCheckError::Protocol(ProtocolError::with_causes(
            WfErrorCode::ReferenceError,
            format!("reference verification failed for {}", message.log_context()),
            vec![cause],
        ))
    }

    /// Verifies the message's reference and sets
    /// `MetaHeader.referenceValid`.
    pub async fn verify_reference(
        &self,
        message: &mut WhiteflagMessage,
    ) -> Result<(), ReferenceCheckError> {
        let Some(header) = message.message_header.clone() else {
            return Err(Self::violation(
                message,
                "message is not decoded".to_string(),
            ));
        };

        // Test messages may reference anything.
        if header.message_code == MessageCode::Test {
            message.meta_header.reference_valid = Some(true);
            return Ok(());
        }

        let indicator = header.reference_indicator.chars().next().unwrap_or('0');
        if indicator == '0' {
            // An original message; the referenced message field may hold
            // anything and is ignored.
            message.meta_header.reference_valid = Some(true);
            return Ok(());
        }

        if header.referenced_message == ZERO_REFERENCE {
            message.meta_header.reference_valid = Some(false);
            return Err(Self::violation(
                message,
                format!("reference indicator {indicator} without a referenced message hash"),
            ));
        }

        if !allowed_indicators(header.message_code).contains(&indicator) {
            message.meta_header.reference_valid = Some(false);
            return Err(Self::violation(
                message,
                format!(
                    "message code {} does not allow reference indicator {indicator}",
                    header.message_code
                ),
            ));
        }

        let blockchain = message.meta_header.blockchain.clone();
        let referenced = self
            .retriever
            .get_message(&header.referenced_message, Some(&blockchain))
            .await
            .map_err(ReferenceCheckError::Lookup)?;
        let Some(referenced) = referenced.first() else {
            message.meta_header.reference_valid = Some(false);
            return Err(Self::violation(
                message,
                format!("referenced message {} not found", header.referenced_message),
            ));
        };

        let mut causes = Vec::new();

        if let Some(referenced_header) = &referenced.message_header {
            let referenced_code = referenced_header.message_code;
            if !allowed_referenced_codes(header.message_code).contains(&referenced_code) {
                causes.push(format!(
                    "message code {} cannot reference a {} message",
                    header.message_code, referenced_code
                ));
            }

            if let Some(policy) = policy(indicator) {
                let referenced_indicator = referenced_header
                    .reference_indicator
                    .chars()
                    .next()
                    .unwrap_or('0');
                if !policy.allowed_to_reference.contains(&referenced_indicator) {
                    causes.push(format!(
                        "reference indicator {indicator} cannot reference a message with \
                         reference indicator {referenced_indicator}"
                    ));
                }

                let originators = (
                    message.meta_header.originator_address.as_deref(),
                    referenced.meta_header.originator_address.as_deref(),
                );
                if let (Some(own), Some(other)) = originators {
                    let same = own.eq_ignore_ascii_case(other);
                    if same && !policy.same_originator {
                        causes.push(format!(
                            "reference indicator {indicator} cannot reference the same originator"
                        ));
                    }
                    if !same && !policy.different_originator {
                        causes.push(format!(
                            "reference indicator {indicator} cannot reference a different \
                             originator"
                        ));
                    }
                }
            }
        }

        if causes.is_empty() {
            message.meta_header.reference_valid = Some(true);
            Ok(())
        } else {
            message.meta_header.reference_valid = Some(false);
            Err(ReferenceCheckError::Protocol(ProtocolError::with_causes(
                WfErrorCode::ReferenceError,
                format!("reference verification failed for {}", message.log_context()),
                causes,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use wf_blockchain::test_utils::MockAdapter;
    use wf_blockchain::{BlockchainAdapter, BlockchainRegistry};
    use wf_config::{BlockchainConfig, DatastoreConfig};
    use wf_datastore::{Datastore, DatastoreRegistry, MemoryDatastore};
    use wf_events::EventBus;
    use wf_protocol::{
        FreeTextBody, MessageBody, MessageHeader, SignSignalBody, TestBody, WhiteflagMessage,
    };

    use super::*;

    fn h(seed: u8) -> String {
        format!("{seed:02x}").repeat(32)
    }

    async fn fixture() -> (ReferenceValidator, Arc<MemoryDatastore>) {
        let store = Arc::new(MemoryDatastore::new());
        let mut datastores = DatastoreRegistry::new();
        datastores
            .register(
                DatastoreConfig::for_tests("primary", true),
                Arc::clone(&store) as Arc<dyn Datastore>,
            )
            .await
            .unwrap();
        let mut blockchains = BlockchainRegistry::new();
        blockchains
            .register(
                BlockchainConfig::for_tests("ethereum"),
                Arc::new(MockAdapter::new()) as Arc<dyn BlockchainAdapter>,
            )
            .await
            .unwrap();
        let retriever = Retriever::new(
            Arc::new(datastores),
            Arc::new(blockchains),
            Arc::new(EventBus::default()),
        );
        (ReferenceValidator::new(Arc::new(retriever)), store)
    }

    fn message(
        code: MessageCode,
        indicator: char,
        referenced: &str,
        originator: &str,
        hash: Option<&str>,
    ) -> WhiteflagMessage {
        let mut header = MessageHeader::original(code);
        header.reference_indicator = indicator.to_string();
        header.referenced_message = referenced.to_string();
        let body = MessageBody::FreeText(FreeTextBody {
            text: "reference test".to_string(),
        });
        let mut message = WhiteflagMessage::new("ethereum", header, body);
        message.meta_header.originator_address = Some(originator.to_string());
        message.meta_header.transaction_hash = hash.map(|h| h.to_string());
        message
    }

    #[tokio::test]
    async fn indicator_zero_is_always_valid() {
        let (validator, _) = fixture().await;
        let mut m = message(MessageCode::FreeText, '0', ZERO_REFERENCE, "00aa", None);
        validator.verify_reference(&mut m).await.unwrap();
        assert_eq!(m.meta_header.reference_valid, Some(true));
    }

    #[tokio::test]
    async fn nonzero_indicator_with_zero_hash_is_rejected() {
        let (validator, _) = fixture().await;
        let mut m = message(MessageCode::FreeText, '1', ZERO_REFERENCE, "00aa", None);
        let err = validator.verify_reference(&mut m).await.unwrap_err();
        assert_matches!(err, ReferenceCheckError::Protocol(protocol) => {
            assert_eq!(protocol.code, WfErrorCode::ReferenceError);
            assert!(protocol.causes[0].contains("without a referenced message hash"));
        });
        assert_eq!(m.meta_header.reference_valid, Some(false));
    }

    #[tokio::test]
    async fn missing_referenced_message_is_rejected() {
        let (validator, _) = fixture().await;
        let mut m = message(MessageCode::FreeText, '4', &h(0xaa), "00aa", None);
        let err = validator.verify_reference(&mut m).await.unwrap_err();
        assert_matches!(err, ReferenceCheckError::Protocol(protocol) => {
            assert!(protocol.causes[0].contains("not found"));
        });
    }

    #[tokio::test]
    async fn recall_requires_the_same_originator() {
        let (validator, store) = fixture().await;
        let original = message(MessageCode::FreeText, '0', ZERO_REFERENCE, "00aa", Some(&h(1)));
        store.store_message(&original).await.unwrap();

        let mut own_recall = message(MessageCode::FreeText, '1', &h(1), "00AA", None);
        validator.verify_reference(&mut own_recall).await.unwrap();
        assert_eq!(own_recall.meta_header.reference_valid, Some(true));

        let mut foreign_recall = message(MessageCode::FreeText, '1', &h(1), "00bb", None);
        let err = validator
            .verify_reference(&mut foreign_recall)
            .await
            .unwrap_err();
        assert_matches!(err, ReferenceCheckError::Protocol(protocol) => {
            assert!(protocol.causes[0].contains("different originator"));
        });
    }

    #[tokio::test]
    async fn recall_cannot_reference_a_related_message() {
        let (validator, store) = fixture().await;
        let mut related = message(MessageCode::FreeText, '0', ZERO_REFERENCE, "00aa", Some(&h(1)));
        store.store_message(&related).await.unwrap();
        related = message(MessageCode::FreeText, '4', &h(1), "00aa", Some(&h(2)));
        store.store_message(&related).await.unwrap();

        let mut recall = message(MessageCode::FreeText, '1', &h(2), "00aa", None);
        let err = validator.verify_reference(&mut recall).await.unwrap_err();
        assert_matches!(err, ReferenceCheckError::Protocol(protocol) => {
            assert!(protocol.causes[0].contains("reference indicator 4"));
        });
    }

    #[tokio::test]
    async fn test_messages_skip_reference_checks() {
        let (validator, _) = fixture().await;
        let mut header = MessageHeader::original(MessageCode::Test);
        header.reference_indicator = "1".to_string();
        let mut m = WhiteflagMessage::new(
            "ethereum",
            header,
            MessageBody::Test(TestBody {
                pseudo_message_code: "M".to_string(),
                pseudo_body: Box::new(MessageBody::SignSignal(SignSignalBody {
                    subject_code: "10".to_string(),
                    date_time: "2020-07-01T12:34:56Z".to_string(),
                    duration: "P00D01H30M".to_string(),
                    object_type: "22".to_string(),
                    object_latitude: "+39.09350".to_string(),
                    object_longitude: "-122.34500".to_string(),
                    object_size_dim1: "0100".to_string(),
                    object_size_dim2: "0100".to_string(),
                    object_orientation: "045".to_string(),
                    object_requests: Vec::new(),
                })),
            }),
        );
        validator.verify_reference(&mut m).await.unwrap();
        assert_eq!(m.meta_header.reference_valid, Some(true));
    }

    #[tokio::test]
    async fn verdict_is_idempotent() {
        let (validator, store) = fixture().await;
        let original = message(MessageCode::FreeText, '0', ZERO_REFERENCE, "00aa", Some(&h(1)));
        store.store_message(&original).await.unwrap();

        let mut update = message(MessageCode::FreeText, '2', &h(1), "00aa", None);
        validator.verify_reference(&mut update).await.unwrap();
        let first = update.meta_header.reference_valid;
        validator.verify_reference(&mut update).await.unwrap();
        assert_eq!(update.meta_header.reference_valid, first);
    }
}
