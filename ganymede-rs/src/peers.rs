//! Defines the contracts through which a group talks to remote peers.
//!
//! A [Group](crate::group::Group) doesn't know anything about networking. Once peers are
//! registered, it asks a [PeerPicker] which peer owns a key and then uses the returned
//! [PeerGetter] to fetch the value from there. The HTTP based implementation of both contracts
//! is provided by [HttpPool](crate::pool::HttpPool).
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CacheResult;
use crate::protocol::{GetRequest, GetResponse};

/// Determines the remote peer which owns a given key.
pub trait PeerPicker: Send + Sync {
    /// Returns the getter for the peer owning the key.
    ///
    /// Returns **None** if no peers are known or if the local node itself owns the key. An
    /// implementation must never hand out a getter pointing to the local node.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

/// Fetches a value from a single remote peer.
#[async_trait]
pub trait PeerGetter: Send + Sync {
    /// Performs a round-trip to the peer and returns its response.
    ///
    /// Any failure is reported as [CacheError::Transport](crate::error::CacheError::Transport).
    /// A getter may impose a timeout, the core itself never does.
    async fn get(&self, request: &GetRequest) -> CacheResult<GetResponse>;
}
