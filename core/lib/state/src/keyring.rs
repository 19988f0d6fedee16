use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Keyring categories. Ids within a category identify the counterparty pair
/// or account the secret belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCategory {
    #[serde(rename = "presharedKeys")]
    PresharedKeys,
    #[serde(rename = "negotiatedKeys")]
    NegotiatedKeys,
    #[serde(rename = "ecdhPrivateKeys")]
    EcdhPrivateKeys,
    #[serde(rename = "authTokens")]
    AuthTokens,
}

/// Secret store: category → id → secret bytes. Secrets are kept in
/// zeroising containers and wiped on removal and on drop.
#[derive(Default)]
pub struct Keyring {
    keys: HashMap<KeyCategory, HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl Keyring {
    /// Idempotent insert-or-replace. A replaced secret is wiped.
    pub fn upsert(&mut self, category: KeyCategory, id: &str, secret: Vec<u8>) {
        self.keys
            .entry(category)
            .or_default()
            .insert(id.to_string(), Zeroizing::new(secret));
    }

    pub fn get(&self, category: KeyCategory, id: &str) -> Option<Zeroizing<Vec<u8>>> {
        self.keys
            .get(&category)
            .and_then(|entries| entries.get(id))
            .map(|secret| Zeroizing::new(secret.to_vec()))
    }

    /// Idempotent removal; the secret is zeroised when dropped here.
    pub fn remove(&mut self, category: KeyCategory, id: &str) {
        if let Some(entries) = self.keys.get_mut(&category) {
            entries.remove(id);
        }
    }

    pub fn ids(&self, category: KeyCategory) -> Vec<String> {
        self.keys
            .get(&category)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Hex-encoded snapshot for the sealed state container.
    pub(crate) fn to_snapshot(&self) -> HashMap<KeyCategory, HashMap<String, String>> {
        self.keys
            .iter()
            .map(|(category, entries)| {
                (
                    *category,
                    entries
                        .iter()
                        .map(|(id, secret)| (id.clone(), hex::encode(secret.as_slice())))
                        .collect(),
                )
            })
            .collect()
    }

    pub(crate) fn from_snapshot(
        snapshot: HashMap<KeyCategory, HashMap<String, String>>,
    ) -> Result<Self, hex::FromHexError> {
        let mut keys: HashMap<KeyCategory, HashMap<String, Zeroizing<Vec<u8>>>> = HashMap::new();
        for (category, entries) in snapshot {
            let decoded = entries
                .into_iter()
                .map(|(id, secret_hex)| Ok((id, Zeroizing::new(hex::decode(secret_hex)?))))
                .collect::<Result<HashMap<_, _>, hex::FromHexError>>()?;
            keys.insert(category, decoded);
        }
        Ok(Self { keys })
    }
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self
            .keys
            .iter()
            .map(|(category, entries)| (category, entries.len()))
            .collect();
        f.debug_struct("Keyring").field("entries", &counts).finish()
    }
}
