use serde::{Deserialize, Serialize};
use wf_protocol::TransceiveDirection;

/// An entry in one of the working queues, identified by its natural key.
pub trait QueueEntry {
    fn key(&self) -> &str;
}

/// Generic working queue with upsert-by-key semantics. Operations are atomic
/// per (queue, key) because the state manager serialises all writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Queue<T> {
    entries: Vec<T>,
}

// Not derived: deriving would needlessly bound `T: Default`.
impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: QueueEntry + Clone> Queue<T> {
    pub fn upsert(&mut self, entry: T) {
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.key() == entry.key())
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        let idx = self.entries.iter().position(|entry| entry.key() == key)?;
        Some(self.entries.remove(idx))
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.iter().find(|entry| entry.key() == key)
    }

    /// Snapshot of all entries.
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.clone()
    }

    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) {
        self.entries.retain(keep);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Message awaiting block confirmation. Keyed by transaction hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDepthEntry {
    pub transaction_hash: String,
    pub blockchain: String,
    pub block_number: u64,
    #[serde(default)]
    pub block_depth: u64,
    #[serde(default)]
    pub confirmed: bool,
    pub direction: TransceiveDirection,
}

impl QueueEntry for BlockDepthEntry {
    fn key(&self) -> &str {
        &self.transaction_hash
    }
}

/// Initialisation vector that arrived before its ciphertext. Keyed by the
/// transaction hash of the encrypted message it belongs to (the K-message's
/// `ReferencedMessage`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitVectorEntry {
    pub referenced_message: String,
    pub init_vector: String,
}

impl QueueEntry for InitVectorEntry {
    fn key(&self) -> &str {
        &self.referenced_message
    }
}
