use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use wf_blockchain::test_utils::MockAdapter;
use wf_blockchain::{BlockchainAdapter, BlockchainRegistry};
use wf_config::{BlockchainConfig, DatastoreConfig, ProtocolConfig};
use wf_datastore::{Datastore, DatastoreRegistry, MemoryDatastore};
use wf_events::{Channel, EventBus, EventKind};
use wf_protocol::{
    AuthenticationBody, FreeTextBody, MessageBody, MessageCode, MessageHeader, SignSignalBody,
    TestBody, WfErrorCode, WhiteflagMessage, ZERO_REFERENCE,
};
use wf_references::ReferenceValidator;
use wf_retrieval::Retriever;
use wf_state::StateManager;

use crate::Transmitter;

const ORIGINATOR: &str = "007a0baf6f84f0fa7402ea972686e56d50b707c9b67b108866";
const RECIPIENT: &str = "00b1c55ed603f3aa00f6b23e8c4bbb6ab9b454e0f3f8ab18ee";
const PSK: &str = "32676187ba7badda85ea63a69870a7133909f1999774abb2eed251073616a6e7";

struct Fixture {
    transmitter: Arc<Transmitter>,
    adapter: Arc<MockAdapter>,
    events: Arc<EventBus>,
}

async fn fixture(config: ProtocolConfig) -> Fixture {
    let store = Arc::new(MemoryDatastore::new());
    let mut datastores = DatastoreRegistry::new();
    datastores
        .register(
            DatastoreConfig::for_tests("primary", true),
            store as Arc<dyn Datastore>,
        )
        .await
        .unwrap();
    let datastores = Arc::new(datastores);

    let adapter = Arc::new(MockAdapter::with_block_height(100));
    let mut blockchains = BlockchainRegistry::new();
    blockchains
        .register(
            BlockchainConfig::for_tests("ethereum"),
            Arc::clone(&adapter) as Arc<dyn BlockchainAdapter>,
        )
        .await
        .unwrap();
    let blockchains = Arc::new(blockchains);

    let events = Arc::new(EventBus::default());
    let retriever = Arc::new(Retriever::new(
        Arc::clone(&datastores),
        Arc::clone(&blockchains),
        Arc::clone(&events),
    ));
    let references = Arc::new(ReferenceValidator::new(retriever));
    let state = Arc::new(StateManager::new());

    Fixture {
        transmitter: Arc::new(Transmitter::new(
            config,
            state,
            blockchains,
            references,
            Arc::clone(&events),
        )),
        adapter,
        events,
    }
}

fn free_text_message() -> WhiteflagMessage {
    let mut message = WhiteflagMessage::new(
        "ethereum",
        MessageHeader::original(MessageCode::FreeText),
        MessageBody::FreeText(FreeTextBody {
            text: "free text over the chain".to_string(),
        }),
    );
    message.meta_header.originator_address = Some(ORIGINATOR.to_string());
    message
}

fn test_message() -> WhiteflagMessage {
    let mut message = WhiteflagMessage::new(
        "ethereum",
        MessageHeader::original(MessageCode::Test),
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
    message.meta_header.originator_address = Some(ORIGINATOR.to_string());
    message
}

#[tokio::test]
async fn free_text_message_travels_the_whole_pipeline() {
    let f = fixture(ProtocolConfig::for_tests()).await;
    let mut observed = f.events.subscribe(Channel::Tx);

    let sent = f.transmitter.send(free_text_message()).await.unwrap();

    assert_eq!(sent.meta_header.transmission_success, Some(true));
    assert!(sent.meta_header.transaction_hash.is_some());
    assert_eq!(sent.meta_header.block_number, Some(100));
    assert_eq!(sent.meta_header.format_valid, Some(true));
    assert_eq!(f.adapter.sent_messages().len(), 1);

    let mut kinds = Vec::new();
    while let Ok(event) = observed.try_recv() {
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            EventKind::MessageCommitted,
            EventKind::MetadataVerified,
            EventKind::ReferenceVerified,
            EventKind::MessageEncoded,
            EventKind::MessageSent,
            EventKind::MessageProcessed,
        ]
    );
}

#[tokio::test]
async fn missing_originator_fails_metadata_verification() {
    let f = fixture(ProtocolConfig::for_tests()).await;
    let mut message = free_text_message();
    message.meta_header.originator_address = None;

    let err = f.transmitter.send(message).await.unwrap_err();
    assert_matches!(err.code, WfErrorCode::MetaheaderError);
    assert!(f.adapter.sent_messages().is_empty());
}

#[tokio::test]
async fn format_violations_are_fatal() {
    let f = fixture(ProtocolConfig::for_tests()).await;
    let mut message = WhiteflagMessage::new(
        "ethereum",
        MessageHeader::original(MessageCode::Authentication),
        MessageBody::Authentication(AuthenticationBody {
            verification_method: "9".to_string(),
            verification_data: "https://example.org/auth.json".to_string(),
        }),
    );
    message.meta_header.originator_address = Some(ORIGINATOR.to_string());

    let err = f.transmitter.send(message).await.unwrap_err();
    assert_matches!(err.code, WfErrorCode::FormatError);
}

#[tokio::test]
async fn reference_violations_are_fatal_in_tx() {
    let f = fixture(ProtocolConfig::for_tests()).await;
    let mut message = free_text_message();
    message.message_header.as_mut().unwrap().reference_indicator = "1".to_string();
    assert_eq!(
        message.message_header.as_ref().unwrap().referenced_message,
        ZERO_REFERENCE
    );

    let err = f.transmitter.send(message).await.unwrap_err();
    assert_matches!(err.code, WfErrorCode::ReferenceError);
}

#[tokio::test]
async fn test_only_mode_rejects_operational_messages() {
    let mut config = ProtocolConfig::for_tests();
    config.tx.test_messages_only = true;
    let f = fixture(config).await;

    let err = f.transmitter.send(free_text_message()).await.unwrap_err();
    assert_matches!(err.code, WfErrorCode::NotAllowed);

    f.transmitter.send(test_message()).await.unwrap();
    assert_eq!(f.adapter.sent_messages().len(), 1);
}

#[tokio::test]
async fn encrypted_send_keeps_the_prefix_clear_and_announces_the_iv() {
    let mut config = ProtocolConfig::for_tests();
    config.encryption.psk = Some(PSK.to_string());
    let f = fixture(config).await;

    let mut message = free_text_message();
    message.message_header.as_mut().unwrap().encryption_indicator = "2".to_string();
    message.meta_header.recipient_address = Some(RECIPIENT.to_string());

    let sent = f.transmitter.send(message).await.unwrap();
    let encoded = sent.meta_header.encoded_message.clone().unwrap();
    let iv = sent.meta_header.encryption_init_vector.clone().unwrap();
    assert_eq!(&encoded[..8], "57463132");
    assert_eq!(iv.len(), 32);

    // The pipeline spawns the IV announcement; wait for it to be sent.
    let announcement = {
        let mut found = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let sent_messages = f.adapter.sent_messages();
            if sent_messages.len() == 2 {
                found = Some(sent_messages[1].clone());
                break;
            }
        }
        found.expect("no IV announcement was sent")
    };

    assert_eq!(announcement.code(), Some(MessageCode::Crypto));
    assert!(announcement.meta_header.auto_generated);
    let header = announcement.message_header.as_ref().unwrap();
    assert_eq!(header.reference_indicator, "3");
    assert_eq!(
        header.referenced_message,
        sent.meta_header.transaction_hash.clone().unwrap()
    );
    assert_matches!(
        announcement.message_body.as_ref().unwrap(),
        MessageBody::Crypto(body) if body.crypto_data == iv && body.crypto_data_type == "21"
    );
}

#[tokio::test]
async fn encryption_without_any_key_fails() {
    let f = fixture(ProtocolConfig::for_tests()).await;
    let mut message = free_text_message();
    message.message_header.as_mut().unwrap().encryption_indicator = "2".to_string();

    let err = f.transmitter.send(message).await.unwrap_err();
    assert_matches!(err.code, WfErrorCode::EncryptionError);
}

#[tokio::test]
async fn reserved_encryption_methods_are_rejected() {
    let f = fixture(ProtocolConfig::for_tests()).await;
    let mut message = free_text_message();
    message.message_header.as_mut().unwrap().encryption_indicator = "7".to_string();

    let err = f.transmitter.send(message).await.unwrap_err();
    assert_matches!(err.code, WfErrorCode::EncryptionError);
}

#[tokio::test(start_paused = true)]
async fn failed_auto_generated_send_is_retried_once() {
    let f = fixture(ProtocolConfig::for_tests()).await;
    f.adapter.fail_next_sends(1);

    let mut message = free_text_message();
    message.meta_header.auto_generated = true;

    let err = f.transmitter.send(message).await.unwrap_err();
    assert_matches!(err.code, WfErrorCode::NotAvailable);
    assert!(f.adapter.sent_messages().is_empty());

    tokio::time::sleep(Duration::from_secs(21)).await;
    assert_eq!(f.adapter.sent_messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_happens_only_once() {
    let f = fixture(ProtocolConfig::for_tests()).await;
    f.adapter.fail_next_sends(5);

    let mut message = free_text_message();
    message.meta_header.auto_generated = true;

    let _ = f.transmitter.send(message).await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(f.adapter.sent_messages().is_empty());
    // The first attempt and its single retry are the only sends tried.
}
