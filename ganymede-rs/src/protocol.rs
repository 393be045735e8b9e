//! Contains the envelope exchanged between peers.
//!
//! A peer asks another one for a value using a [GetRequest] and receives a [GetResponse]. Both are
//! serialized using **bincode**, a compact binary format which both ends agree upon as they run
//! the same code.
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Asks a peer for the value of a key within one of its groups.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    /// Contains the name of the group to query.
    pub group: String,

    /// Contains the key to fetch.
    pub key: String,
}

/// Carries the value which a peer determined for a [GetRequest].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct GetResponse {
    /// Contains the raw bytes of the value.
    pub value: Vec<u8>,
}

impl GetRequest {
    /// Creates a new request for the given group and key.
    pub fn new(group: impl Into<String>, key: impl Into<String>) -> Self {
        GetRequest {
            group: group.into(),
            key: key.into(),
        }
    }
}

impl GetResponse {
    /// Encodes the response so that it can be sent as HTTP body.
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        bincode::serialize(self).context("Failed to encode response.")
    }

    /// Decodes a response as received from a peer.
    pub fn decode(data: &[u8]) -> anyhow::Result<Self> {
        bincode::deserialize(data).context("Failed to decode response.")
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::GetResponse;

    #[test]
    fn responses_survive_the_wire() {
        let response = GetResponse {
            value: b"630".to_vec(),
        };
        let encoded = response.encode().unwrap();
        assert_eq!(GetResponse::decode(&encoded).unwrap(), response);
    }

    #[test]
    fn garbage_is_rejected() {
        // A length prefix which announces way more data than present...
        assert!(GetResponse::decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F]).is_err());
    }
}
