use crate::{DatastoreError, DatastoreResult, StateEnvelope};

/// Packages a serialised state snapshot into its at-rest container and back.
/// The container format and any at-rest keying are implementation concerns;
/// the core only moves envelopes around.
pub trait StateSealer: Send + Sync {
    fn seal(&self, snapshot: &[u8]) -> DatastoreResult<StateEnvelope>;
    fn unseal(&self, envelope: &StateEnvelope) -> DatastoreResult<Vec<u8>>;
}

/// Hex passthrough container, for tests and unencrypted embedded stores.
#[derive(Debug, Default)]
pub struct PlainSealer;

impl StateSealer for PlainSealer {
    fn seal(&self, snapshot: &[u8]) -> DatastoreResult<StateEnvelope> {
        Ok(StateEnvelope {
            format: "plain".to_string(),
            container: hex::encode(snapshot),
        })
    }

    fn unseal(&self, envelope: &StateEnvelope) -> DatastoreResult<Vec<u8>> {
        if envelope.format != "plain" {
            return Err(DatastoreError::Container(format!(
                "unsupported container format {:?}",
                envelope.format
            )));
        }
        hex::decode(&envelope.container)
            .map_err(|err| DatastoreError::Container(err.to_string()))
    }
}

impl std::fmt::Debug for dyn StateSealer + 'static {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSealer").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_sealer_round_trips() {
        let sealer = PlainSealer;
        let snapshot = br#"{"originators":{}}"#;
        let envelope = sealer.seal(snapshot).unwrap();
        assert_eq!(envelope.format, "plain");
        assert_eq!(sealer.unseal(&envelope).unwrap(), snapshot);
    }

    #[test]
    fn unknown_format_is_rejected() {
        let envelope = StateEnvelope {
            format: "aes-256-gcm".to_string(),
            container: "00".to_string(),
        };
        assert!(PlainSealer.unseal(&envelope).is_err());
    }
}
