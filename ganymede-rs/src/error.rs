//! Defines the error type reported by groups and peer transports.
//!
//! A [CacheError] is **Clone** as a single failed load is shared with every caller which was
//! coalesced onto it. Loaders and internal plumbing report **anyhow** errors which are turned into
//! a [CacheError::Load] carrying the original message unchanged.
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Enumerates the failures a cache operation can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The caller provided an invalid argument, like an empty key or a malformed peer path.
    InvalidArgument(String),

    /// A group or the registry was wired up incorrectly (e.g. peers were registered twice).
    Setup(String),

    /// The loader of a group failed. Contains the message of the loader unaltered.
    Load(String),

    /// Talking to a remote peer failed.
    Transport(String),

    /// A peer asked for a group which isn't known locally.
    NoSuchGroup(String),
}

impl From<anyhow::Error> for CacheError {
    fn from(error: anyhow::Error) -> CacheError {
        CacheError::Load(error.to_string())
    }
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            CacheError::InvalidArgument(message) => write!(f, "{}", message),
            CacheError::Setup(message) => write!(f, "{}", message),
            CacheError::Load(message) => write!(f, "{}", message),
            CacheError::Transport(message) => write!(f, "peer request failed: {}", message),
            CacheError::NoSuchGroup(name) => write!(f, "no such group: {}", name),
        }
    }
}

impl Error for CacheError {}

/// Represents the result of all cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
