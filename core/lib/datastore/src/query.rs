use wf_protocol::{MessageCode, WhiteflagMessage};

/// Equality filters on message metadata. Unset fields match everything; the
/// datastore contract supports no richer query language.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageQuery {
    pub blockchain: Option<String>,
    pub transaction_hash: Option<String>,
    pub referenced_message: Option<String>,
    pub originator_address: Option<String>,
    pub message_code: Option<MessageCode>,
}

impl MessageQuery {
    pub fn by_transaction_hash(hash: &str, blockchain: Option<&str>) -> Self {
        Self {
            blockchain: blockchain.map(|b| b.to_string()),
            transaction_hash: Some(wf_utils::normalize_hex(hash)),
            ..Self::default()
        }
    }

    pub fn by_referenced_message(hash: &str, blockchain: Option<&str>) -> Self {
        Self {
            blockchain: blockchain.map(|b| b.to_string()),
            referenced_message: Some(wf_utils::normalize_hex(hash)),
            ..Self::default()
        }
    }

    /// Authentication messages sent from one address.
    pub fn auth_messages(address: &str, blockchain: Option<&str>) -> Self {
        Self {
            blockchain: blockchain.map(|b| b.to_string()),
            originator_address: Some(address.to_string()),
            message_code: Some(MessageCode::Authentication),
            ..Self::default()
        }
    }

    pub fn matches(&self, message: &WhiteflagMessage) -> bool {
        if let Some(blockchain) = &self.blockchain {
            if &message.meta_header.blockchain != blockchain {
                return false;
            }
        }
        if let Some(hash) = &self.transaction_hash {
            if message.meta_header.transaction_hash.as_deref() != Some(hash.as_str()) {
                return false;
            }
        }
        if let Some(referenced) = &self.referenced_message {
            let matches = message
                .message_header
                .as_ref()
                .map(|h| h.referenced_message.eq_ignore_ascii_case(referenced))
                .unwrap_or(false);
            if !matches {
                return false;
            }
        }
        if let Some(address) = &self.originator_address {
            let matches = message
                .meta_header
                .originator_address
                .as_deref()
                .map(|a| a.eq_ignore_ascii_case(address))
                .unwrap_or(false);
            if !matches {
                return false;
            }
        }
        if let Some(code) = self.message_code {
            if message.code() != Some(code) {
                return false;
            }
        }
        true
    }
}
