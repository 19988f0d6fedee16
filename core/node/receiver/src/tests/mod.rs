use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use wf_authentication::Authenticator;
use wf_blockchain::test_utils::MockAdapter;
use wf_blockchain::{BlockchainAdapter, BlockchainRegistry, RawTransaction};
use wf_config::{BlockchainConfig, DatastoreConfig, ProtocolConfig};
use wf_crypto::{derive_key, key_id, EncryptionMethod, WfCipher};
use wf_datastore::{Datastore, DatastoreRegistry, MemoryDatastore, MessageQuery};
use wf_events::{Channel, EventBus, EventKind};
use wf_protocol::{
    AuthenticationBody, CryptoBody, FreeTextBody, MessageBody, MessageCode, MessageHeader,
    SignSignalBody, WfErrorCode, WhiteflagMessage,
};
use wf_references::ReferenceValidator;
use wf_retrieval::Retriever;
use wf_state::{Account, KeyCategory, StateManager};

use crate::Receiver;

const ORIGINATOR: &str = "007a0baf6f84f0fa7402ea972686e56d50b707c9b67b108866";
const RECIPIENT: &str = "00b1c55ed603f3aa00f6b23e8c4bbb6ab9b454e0f3f8ab18ee";
const PSK: &str = "32676187ba7badda85ea63a69870a7133909f1999774abb2eed251073616a6e7";
const IV: &str = "40aa85015d24e4601448c1ba8d7bf1aa";

fn h(seed: u8) -> String {
    format!("{seed:02x}").repeat(32)
}

struct Fixture {
    receiver: Arc<Receiver>,
    store: Arc<MemoryDatastore>,
    state: Arc<StateManager>,
    events: Arc<EventBus>,
}

async fn fixture(config: ProtocolConfig) -> Fixture {
    let store = Arc::new(MemoryDatastore::new());
    let mut datastores = DatastoreRegistry::new();
    datastores
        .register(
            DatastoreConfig::for_tests("primary", true),
            Arc::clone(&store) as Arc<dyn Datastore>,
        )
        .await
        .unwrap();
    let datastores = Arc::new(datastores);

    let adapter = Arc::new(MockAdapter::with_block_height(100));
    let mut blockchains = BlockchainRegistry::new();
    blockchains
        .register(
            BlockchainConfig::for_tests("ethereum"),
            adapter as Arc<dyn BlockchainAdapter>,
        )
        .await
        .unwrap();
    let blockchains = Arc::new(blockchains);

    let events = Arc::new(EventBus::default());
    // Store pipeline output like the running relay does.
    Arc::clone(&datastores).attach(&events);

    let retriever = Arc::new(Retriever::new(
        Arc::clone(&datastores),
        Arc::clone(&blockchains),
        Arc::clone(&events),
    ));
    let references = Arc::new(ReferenceValidator::new(Arc::clone(&retriever)));
    let state = Arc::new(StateManager::new());
    let authenticator = Arc::new(Authenticator::new(
        Arc::clone(&retriever),
        Arc::clone(&blockchains),
        Arc::clone(&state),
    ));

    Fixture {
        receiver: Arc::new(Receiver::new(
            config,
            Arc::clone(&state),
            blockchains,
            authenticator,
            references,
            retriever,
            Arc::clone(&events),
        )),
        store,
        state,
        events,
    }
}

fn no_auth_config() -> ProtocolConfig {
    let mut config = ProtocolConfig::for_tests();
    config.rx.verify_originator = false;
    config
}

fn signal_body() -> SignSignalBody {
    SignSignalBody {
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
    }
}

fn raw(hash: &str, encoded: Vec<u8>) -> RawTransaction {
    RawTransaction {
        transaction_hash: hash.to_string(),
        block_number: Some(95),
        transaction_time: None,
        originator_address: ORIGINATOR.to_string(),
        originator_pub_key: None,
        recipient_address: None,
        encoded_message: hex::encode(encoded),
    }
}

/// Encodes a P-message and encrypts it with method 2 for the fixed
/// originator, PSK and IV.
fn encrypted_signal() -> (Vec<u8>, MessageHeader, MessageBody) {
    let mut header = MessageHeader::original(MessageCode::ProtectiveSign);
    header.encryption_indicator = "2".to_string();
    let body = MessageBody::SignSignal(signal_body());
    let mut buffer = wf_protocol::encode(&header, &body).unwrap();

    let ikm = hex::decode(PSK).unwrap();
    let address = hex::decode(ORIGINATOR).unwrap();
    let key = derive_key(EncryptionMethod::PskAesCtr, &ikm, &address).unwrap();
    WfCipher::from_key(key)
        .with_iv_hex(IV)
        .unwrap()
        .process(&mut buffer)
        .unwrap();
    (buffer, header, body)
}

fn iv_announcement_encoded(referenced: &str) -> Vec<u8> {
    let mut header = MessageHeader::original(MessageCode::Crypto);
    header.reference_indicator = "3".to_string();
    header.referenced_message = referenced.to_string();
    let body = MessageBody::Crypto(CryptoBody {
        crypto_data_type: "21".to_string(),
        crypto_data: IV.to_string(),
    });
    wf_protocol::encode(&header, &body).unwrap()
}

async fn stored_by_hash(store: &MemoryDatastore, hash: &str) -> Option<WhiteflagMessage> {
    store
        .get_messages(&MessageQuery::by_transaction_hash(hash, Some("ethereum")))
        .await
        .unwrap()
        .into_iter()
        .next()
}

#[tokio::test]
async fn unencrypted_message_is_decoded_and_processed() {
    let f = fixture(no_auth_config()).await;
    let mut observed = f.events.subscribe(Channel::Rx);

    let encoded = wf_protocol::encode(
        &MessageHeader::original(MessageCode::FreeText),
        &MessageBody::FreeText(FreeTextBody {
            text: "hello from the chain".to_string(),
        }),
    )
    .unwrap();
    let mut raw = raw(&h(0x1a).to_uppercase(), encoded);
    raw.transaction_hash = format!("0x{}", raw.transaction_hash);

    let message = f.receiver.receive_raw("ethereum", raw).await.unwrap();

    assert!(message.is_decoded());
    assert_eq!(message.code(), Some(MessageCode::FreeText));
    assert_eq!(message.meta_header.transaction_hash, Some(h(0x1a)));
    assert_eq!(message.meta_header.format_valid, Some(true));
    assert!(message.meta_header.transaction_time.is_some());

    let mut kinds = Vec::new();
    while let Ok(event) = observed.try_recv() {
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            EventKind::MessageReceived,
            EventKind::MetadataVerified,
            EventKind::MessageDecoded,
            EventKind::OriginatorSkipped,
            EventKind::ReferenceVerified,
            EventKind::MessageProcessed,
        ]
    );
}

#[tokio::test]
async fn missing_transaction_hash_is_a_metaheader_error() {
    let f = fixture(no_auth_config()).await;
    let mut raw = raw(&h(0x1b), vec![0x57, 0x46, 0x31, 0x30]);
    raw.transaction_hash = String::new();

    let err = f.receiver.receive_raw("ethereum", raw).await.unwrap_err();
    assert_matches!(err.code, WfErrorCode::MetaheaderError);
}

#[tokio::test]
async fn unauthenticated_originator_is_a_warning_by_default() {
    let f = fixture(ProtocolConfig::for_tests()).await;
    let encoded = wf_protocol::encode(
        &MessageHeader::original(MessageCode::FreeText),
        &MessageBody::FreeText(FreeTextBody {
            text: "unauthenticated".to_string(),
        }),
    )
    .unwrap();

    let message = f
        .receiver
        .receive_raw("ethereum", raw(&h(0x1c), encoded))
        .await
        .unwrap();
    assert_eq!(message.meta_header.originator_valid, Some(false));
    assert!(!message.meta_header.validation_errors.is_empty());
    assert!(message.meta_header.validation_errors[0].contains("WF_AUTH_ERROR"));
}

#[tokio::test]
async fn strict_authentication_makes_failures_fatal() {
    let mut config = ProtocolConfig::for_tests();
    config.authentication.strict = true;
    let f = fixture(config).await;

    let encoded = wf_protocol::encode(
        &MessageHeader::original(MessageCode::FreeText),
        &MessageBody::FreeText(FreeTextBody {
            text: "unauthenticated".to_string(),
        }),
    )
    .unwrap();
    let err = f
        .receiver
        .receive_raw("ethereum", raw(&h(0x1d), encoded))
        .await
        .unwrap_err();
    assert_matches!(err.code, WfErrorCode::AuthError);
}

#[tokio::test]
async fn authentication_messages_are_self_authenticating() {
    let f = fixture(ProtocolConfig::for_tests()).await;
    let encoded = wf_protocol::encode(
        &MessageHeader::original(MessageCode::Authentication),
        &MessageBody::Authentication(AuthenticationBody {
            verification_method: "1".to_string(),
            verification_data: "https://example.org/auth.json".to_string(),
        }),
    )
    .unwrap();

    let message = f
        .receiver
        .receive_raw("ethereum", raw(&h(0x1e), encoded))
        .await
        .unwrap();
    // No auth error recorded: the check was skipped entirely.
    assert!(message.meta_header.validation_errors.is_empty());
    assert_eq!(message.meta_header.originator_valid, None);
}

#[tokio::test]
async fn encrypted_message_without_iv_is_held_then_paired() {
    let mut config = no_auth_config();
    config.encryption.psk = Some(PSK.to_string());
    let f = fixture(config).await;

    let (ciphertext, original_header, original_body) = encrypted_signal();
    let held = f
        .receiver
        .receive_raw("ethereum", raw(&h(0x21), ciphertext))
        .await
        .unwrap();
    assert!(!held.is_decoded());
    assert!(held.meta_header.encoded_message.is_some());

    // Give the event loop a moment to store the held ciphertext.
    for _ in 0..50 {
        if stored_by_hash(&f.store, &h(0x21)).await.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // The matching K-message arrives and pairs up.
    f.receiver
        .receive_raw("ethereum", raw(&h(0x22), iv_announcement_encoded(&h(0x21))))
        .await
        .unwrap();

    let mut decoded = None;
    for _ in 0..100 {
        if let Some(stored) = stored_by_hash(&f.store, &h(0x21)).await {
            if stored.is_decoded() {
                decoded = Some(stored);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let decoded = decoded.expect("held ciphertext was never decoded");
    assert_eq!(decoded.message_header, Some(original_header));
    assert_eq!(decoded.message_body, Some(original_body));
    assert_eq!(
        decoded.meta_header.encryption_init_vector.as_deref(),
        Some(IV)
    );
}

#[tokio::test]
async fn iv_arriving_first_is_queued_for_the_ciphertext() {
    let mut config = no_auth_config();
    config.encryption.psk = Some(PSK.to_string());
    let f = fixture(config).await;

    f.receiver
        .receive_raw("ethereum", raw(&h(0x32), iv_announcement_encoded(&h(0x31))))
        .await
        .unwrap();
    assert_eq!(f.state.get_init_vectors().await.len(), 1);

    let (ciphertext, _, original_body) = encrypted_signal();
    let message = f
        .receiver
        .receive_raw("ethereum", raw(&h(0x31), ciphertext))
        .await
        .unwrap();

    assert!(message.is_decoded());
    assert_eq!(message.message_body, Some(original_body));
    // The queue entry was consumed by the pairing.
    assert!(f.state.get_init_vectors().await.is_empty());
}

#[tokio::test]
async fn key_search_tries_own_accounts() {
    let f = fixture(no_auth_config()).await;
    f.state
        .upsert_account(
            "ethereum",
            Account {
                address: RECIPIENT.to_string(),
                public_key: "02aa".to_string(),
                ..Account::default()
            },
        )
        .await;
    f.state
        .upsert_key(
            KeyCategory::PresharedKeys,
            &key_id("ethereum", ORIGINATOR, RECIPIENT),
            hex::decode(PSK).unwrap(),
        )
        .await;

    let (ciphertext, _, original_body) = encrypted_signal();
    let message = WhiteflagMessage::undecoded(wf_protocol::MetaHeader {
        blockchain: "ethereum".to_string(),
        transaction_hash: Some(h(0x41)),
        originator_address: Some(ORIGINATOR.to_string()),
        encoded_message: Some(hex::encode(ciphertext)),
        encryption_init_vector: Some(IV.to_string()),
        ..wf_protocol::MetaHeader::default()
    });
    let message = f.receiver.receive(message).await.unwrap();

    assert!(message.is_decoded());
    assert_eq!(message.message_body, Some(original_body));
    assert_eq!(
        message.meta_header.recipient_address.as_deref(),
        Some(RECIPIENT)
    );
}

#[tokio::test]
async fn wrong_key_everywhere_is_an_encryption_error() {
    let mut config = no_auth_config();
    config.encryption.psk = Some(h(0x42));
    let f = fixture(config).await;

    let (ciphertext, _, _) = encrypted_signal();
    let message = WhiteflagMessage::undecoded(wf_protocol::MetaHeader {
        blockchain: "ethereum".to_string(),
        transaction_hash: Some(h(0x43)),
        originator_address: Some(ORIGINATOR.to_string()),
        encoded_message: Some(hex::encode(ciphertext)),
        encryption_init_vector: Some(IV.to_string()),
        ..wf_protocol::MetaHeader::default()
    });

    let err = f.receiver.receive(message).await.unwrap_err();
    assert_matches!(err.code, WfErrorCode::EncryptionError);
}

#[tokio::test]
async fn reserved_encryption_methods_are_rejected() {
    let f = fixture(no_auth_config()).await;
    let mut encoded = wf_protocol::encode(
        &MessageHeader::original(MessageCode::FreeText),
        &MessageBody::FreeText(FreeTextBody {
            text: "reserved".to_string(),
        }),
    )
    .unwrap();
    encoded[3] = b'5';

    let err = f
        .receiver
        .receive_raw("ethereum", raw(&h(0x51), encoded))
        .await
        .unwrap_err();
    assert_matches!(err.code, WfErrorCode::EncryptionError);
}

#[tokio::test]
async fn garbage_buffers_fail_decoding() {
    let f = fixture(no_auth_config()).await;
    let err = f
        .receiver
        .receive_raw("ethereum", raw(&h(0x52), vec![0x58, 0x58, 0x31, 0x30, 0x00]))
        .await
        .unwrap_err();
    assert_matches!(err.code, WfErrorCode::FormatError);
}
