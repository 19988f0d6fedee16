use std::sync::Arc;
use std::time::Duration;

use wf_blockchain::test_utils::MockAdapter;
use wf_blockchain::{BlockchainAdapter, BlockchainRegistry, RawTransaction};
use wf_config::{BlockchainConfig, ConfirmationConfig, DatastoreConfig};
use wf_datastore::{Datastore, DatastoreRegistry, MemoryDatastore, MessageQuery};
use wf_events::{Channel, EventBus, EventKind};
use wf_protocol::{
    FreeTextBody, MessageBody, MessageCode, MessageHeader, TransceiveDirection, WhiteflagMessage,
};
use wf_state::{BlockDepthEntry, StateManager};

use crate::ConfirmationTracker;

fn h(seed: u8) -> String {
    format!("{seed:02x}").repeat(32)
}

struct Fixture {
    tracker: Arc<ConfirmationTracker>,
    state: Arc<StateManager>,
    store: Arc<MemoryDatastore>,
    adapter: Arc<MockAdapter>,
    events: Arc<EventBus>,
}

async fn fixture(config: ConfirmationConfig) -> Fixture {
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
            Arc::clone(&adapter) as Arc<dyn BlockchainAdapter>,
        )
        .await
        .unwrap();
    let blockchains = Arc::new(blockchains);

    let state = Arc::new(StateManager::new());
    let events = Arc::new(EventBus::default());

    Fixture {
        tracker: Arc::new(ConfirmationTracker::new(
            config,
            Arc::clone(&state),
            datastores,
            blockchains,
            Arc::clone(&events),
        )),
        state,
        store,
        adapter,
        events,
    }
}

async fn seed_tracked_message(f: &Fixture, hash: &str, block_number: u64) {
    let mut message = WhiteflagMessage::new(
        "ethereum",
        MessageHeader::original(MessageCode::FreeText),
        MessageBody::FreeText(FreeTextBody {
            text: "tracked".to_string(),
        }),
    );
    message.meta_header.transaction_hash = Some(hash.to_string());
    message.meta_header.block_number = Some(block_number);
    let _ = message
        .meta_header
        .set_direction(TransceiveDirection::Rx);
    f.store.store_message(&message).await.unwrap();

    f.adapter.add_transaction(RawTransaction {
        transaction_hash: hash.to_string(),
        block_number: Some(block_number),
        transaction_time: None,
        originator_address: "00aa".to_string(),
        originator_pub_key: None,
        recipient_address: None,
        encoded_message: "57463130".to_string(),
    });

    f.state
        .upsert_block_depth(BlockDepthEntry {
            transaction_hash: hash.to_string(),
            blockchain: "ethereum".to_string(),
            block_number,
            block_depth: 0,
            confirmed: false,
            direction: TransceiveDirection::Rx,
        })
        .await;
}

#[tokio::test]
async fn reaching_the_threshold_confirms_and_removes() {
    let f = fixture(ConfirmationConfig::for_tests()).await;
    f.state.set_highest_block("ethereum", 100).await;
    seed_tracked_message(&f, &h(0x01), 92).await;
    let mut updates = f.events.subscribe(Channel::Rx);

    f.tracker.loop_iteration().await;

    assert!(f.state.get_block_depths().await.is_empty());
    let stored = f
        .store
        .get_messages(&MessageQuery::by_transaction_hash(&h(0x01), None))
        .await
        .unwrap();
    assert_eq!(stored[0].meta_header.confirmed, Some(true));
    assert_eq!(stored[0].meta_header.block_depth, Some(8));

    let event = updates.try_recv().unwrap();
    assert_eq!(event.kind, EventKind::MessageUpdated);
    assert_eq!(event.message.meta_header.confirmed, Some(true));
}

#[tokio::test]
async fn below_the_threshold_the_depth_is_tracked() {
    let f = fixture(ConfirmationConfig::for_tests()).await;
    f.state.set_highest_block("ethereum", 99).await;
    seed_tracked_message(&f, &h(0x02), 92).await;
    let mut updates = f.events.subscribe(Channel::Rx);

    f.tracker.loop_iteration().await;

    let entries = f.state.get_block_depths().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].block_depth, 7);
    assert!(!entries[0].confirmed);
    // No update events unless configured per block.
    assert!(updates.try_recv().is_err());
}

#[tokio::test]
async fn update_each_block_emits_depth_changes() {
    let mut config = ConfirmationConfig::for_tests();
    config.update_each_block = true;
    let f = fixture(config).await;
    f.state.set_highest_block("ethereum", 95).await;
    seed_tracked_message(&f, &h(0x03), 92).await;
    let mut updates = f.events.subscribe(Channel::Rx);

    f.tracker.loop_iteration().await;

    let event = updates.try_recv().unwrap();
    assert_eq!(event.kind, EventKind::MessageUpdated);
    assert_eq!(event.message.meta_header.block_depth, Some(3));
    assert_eq!(event.message.meta_header.confirmed, None);
}

#[tokio::test]
async fn unchanged_depth_is_skipped() {
    let f = fixture(ConfirmationConfig::for_tests()).await;
    f.state.set_highest_block("ethereum", 95).await;
    seed_tracked_message(&f, &h(0x04), 92).await;

    f.tracker.loop_iteration().await;
    let first = f.state.get_block_depths().await;
    f.tracker.loop_iteration().await;
    let second = f.state.get_block_depths().await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn a_reorg_updates_the_block_number_instead_of_confirming() {
    let f = fixture(ConfirmationConfig::for_tests()).await;
    f.state.set_highest_block("ethereum", 100).await;
    seed_tracked_message(&f, &h(0x05), 92).await;
    f.adapter.move_transaction(&h(0x05), 97);

    f.tracker.loop_iteration().await;

    let entries = f.state.get_block_depths().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].block_number, 97);
    assert_eq!(entries[0].block_depth, 3);
    assert!(!entries[0].confirmed);
}

#[tokio::test]
async fn startup_prunes_unknown_blockchains() {
    let f = fixture(ConfirmationConfig::for_tests()).await;
    seed_tracked_message(&f, &h(0x06), 92).await;
    f.state
        .upsert_block_depth(BlockDepthEntry {
            transaction_hash: h(0x07),
            blockchain: "polygon".to_string(),
            block_number: 92,
            block_depth: 0,
            confirmed: false,
            direction: TransceiveDirection::Tx,
        })
        .await;

    f.tracker.prune_unknown_chains().await;

    let entries = f.state.get_block_depths().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].transaction_hash, h(0x06));
}

#[tokio::test]
async fn processed_messages_are_enqueued_from_the_bus() {
    let f = fixture(ConfirmationConfig::for_tests()).await;
    let listener = Arc::clone(&f.tracker).spawn_listener();

    let mut message = WhiteflagMessage::new(
        "ethereum",
        MessageHeader::original(MessageCode::FreeText),
        MessageBody::FreeText(FreeTextBody {
            text: "enqueue me".to_string(),
        }),
    );
    message.meta_header.transaction_hash = Some(h(0x08));
    message.meta_header.block_number = Some(96);
    let _ = message
        .meta_header
        .set_direction(TransceiveDirection::Tx);
    f.events
        .emit(Channel::Tx, EventKind::MessageProcessed, &message);

    let mut enqueued = Vec::new();
    for _ in 0..100 {
        enqueued = f.state.get_block_depths().await;
        if !enqueued.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(enqueued.len(), 1);
    assert_eq!(enqueued[0].block_number, 96);
    assert_eq!(enqueued[0].direction, TransceiveDirection::Tx);

    listener.abort();
}

#[tokio::test]
async fn messages_without_a_block_are_not_tracked() {
    let f = fixture(ConfirmationConfig::for_tests()).await;
    let listener = Arc::clone(&f.tracker).spawn_listener();

    let mut message = WhiteflagMessage::new(
        "ethereum",
        MessageHeader::original(MessageCode::FreeText),
        MessageBody::FreeText(FreeTextBody {
            text: "mempool only".to_string(),
        }),
    );
    message.meta_header.transaction_hash = Some(h(0x09));
    f.events
        .emit(Channel::Rx, EventKind::MessageProcessed, &message);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(f.state.get_block_depths().await.is_empty());

    listener.abort();
}
