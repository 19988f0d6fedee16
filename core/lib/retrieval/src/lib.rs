//! Unified message retrieval: the primary datastore answers first, the
//! blockchain adapter is the fallback for single-transaction lookups.
//! Messages pulled straight off a chain are decoded here and announced as
//! `messageDecoded`.

use std::sync::Arc;

use wf_blockchain::{BlockchainRegistry, RawTransaction, TransactionQuery};
use wf_datastore::{DatastoreRegistry, MessageQuery};
use wf_events::{Channel, EventBus, EventKind};
use wf_protocol::{
    MetaHeader, ProcessingError, TransceiveDirection, WfErrorCode, WhiteflagMessage,
};

#[derive(Debug)]
pub struct Retriever {
    datastores: Arc<DatastoreRegistry>,
    blockchains: Arc<BlockchainRegistry>,
    events: Arc<EventBus>,
}

impl Retriever {
    pub fn new(
        datastores: Arc<DatastoreRegistry>,
        blockchains: Arc<BlockchainRegistry>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            datastores,
            blockchains,
            events,
        }
    }

    fn storage_error(err: wf_datastore::DatastoreError) -> ProcessingError {
        ProcessingError::new(WfErrorCode::NotAvailable, format!("datastore error: {err}"))
    }

    /// Looks up a message by transaction hash: datastore first, then the
    /// blockchain if one is named. An empty result is not an error.
    pub async fn get_message(
        &self,
        transaction_hash: &str,
        blockchain: Option<&str>,
    ) -> Result<Vec<WhiteflagMessage>, ProcessingError> {
        let hash = wf_utils::normalize_hex(transaction_hash);
        let stored = self
            .datastores
            .primary()
            .map_err(Self::storage_error)?
            .get_messages(&MessageQuery::by_transaction_hash(&hash, blockchain))
            .await
            .map_err(Self::storage_error)?;
        if !stored.is_empty() {
            return Ok(stored);
        }

        let Some(blockchain) = blockchain else {
            return Ok(Vec::new());
        };
        let adapter = self.blockchains.get(blockchain)?;
        let raw = match adapter
            .get_message(&TransactionQuery {
                transaction_hash: hash.clone(),
            })
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!("transaction {hash} not found on {blockchain}: {err}");
                return Ok(Vec::new());
            }
        };

        let message = self.message_from_raw(blockchain, raw);
        if message.is_decoded() {
            self.events
                .emit(Channel::Rx, EventKind::MessageDecoded, &message);
        }
        Ok(vec![message])
    }

    /// Builds a message from raw chain data, decoding it when it is not
    /// encrypted. Encrypted transactions stay undecoded here; only the rx
    /// pipeline holds the key search logic.
    fn message_from_raw(&self, blockchain: &str, raw: RawTransaction) -> WhiteflagMessage {
        let mut meta = MetaHeader {
            blockchain: blockchain.to_string(),
            transaction_hash: Some(wf_utils::normalize_hex(&raw.transaction_hash)),
            block_number: raw.block_number,
            transaction_time: raw.transaction_time,
            originator_address: Some(raw.originator_address),
            originator_pub_key: raw.originator_pub_key,
            recipient_address: raw.recipient_address,
            encoded_message: Some(wf_utils::normalize_hex(&raw.encoded_message)),
            ..MetaHeader::default()
        };
        let _ = meta.set_direction(TransceiveDirection::Rx);

        let decoded = wf_utils::decode_hex(&raw.encoded_message)
            .ok()
            .and_then(|encoded| match wf_protocol::encryption_indicator(&encoded) {
                Ok(0) => wf_protocol::decode(&encoded).ok(),
                _ => None,
            });
        match decoded {
            Some((header, body)) => WhiteflagMessage {
                meta_header: meta,
                message_header: Some(header),
                message_body: Some(body),
            },
            None => WhiteflagMessage::undecoded(meta),
        }
    }

    /// All stored messages referencing the given transaction hash.
    pub async fn get_references(
        &self,
        transaction_hash: &str,
        blockchain: Option<&str>,
    ) -> Result<Vec<WhiteflagMessage>, ProcessingError> {
        self.datastores
            .primary()
            .map_err(Self::storage_error)?
            .get_messages(&MessageQuery::by_referenced_message(
                transaction_hash,
                blockchain,
            ))
            .await
            .map_err(Self::storage_error)
    }

    /// Stored authentication messages from one originator address. No
    /// authentication messages is a domain error: the originator cannot be
    /// verified.
    pub async fn get_auth_messages(
        &self,
        address: &str,
        blockchain: Option<&str>,
    ) -> Result<Vec<WhiteflagMessage>, ProcessingError> {
        let messages = self
            .datastores
            .primary()
            .map_err(Self::storage_error)?
            .get_messages(&MessageQuery::auth_messages(address, blockchain))
            .await
            .map_err(Self::storage_error)?;
        if messages.is_empty() {
            return Err(ProcessingError::new(
                WfErrorCode::NoData,
                format!("no authentication messages from {address}"),
            ));
        }
        Ok(messages)
    }

    /// Expands the reference graph seeded at one transaction: every pass
    /// adds all messages referencing a newly included transaction, until a
    /// pass adds nothing.
    // TODO: deduplicate the returned sequence once the normative sequence
    // semantics (superseded message removal) are settled.
    pub async fn get_sequence(
        &self,
        transaction_hash: &str,
        blockchain: &str,
    ) -> Result<Vec<WhiteflagMessage>, ProcessingError> {
        let mut sequence = self.get_message(transaction_hash, Some(blockchain)).await?;
        if sequence.is_empty() {
            return Err(ProcessingError::new(
                WfErrorCode::NoData,
                format!("no message with transaction hash {transaction_hash}"),
            ));
        }

        let mut expanded: Vec<String> = Vec::new();
        let mut index = 0;
        while index < sequence.len() {
            let Some(hash) = sequence[index].meta_header.transaction_hash.clone() else {
                index += 1;
                continue;
            };
            if expanded.contains(&hash) {
                index += 1;
                continue;
            }
            expanded.push(hash.clone());
            let referencing = self.get_references(&hash, Some(blockchain)).await?;
            sequence.extend(referencing);
            index += 1;
        }
        Ok(sequence)
    }
}
