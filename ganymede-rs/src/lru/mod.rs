//! Provides a size constrained LRU store.
//!
//! An LRU store drops the least recently used entry once it is about to grow beyond its memory
//! budget. The budget is given in bytes rather than in entries, so that a store filled with
//! a mix of tiny and huge values is evicted by actual memory pressure. Each entry accounts for
//! the length of its key plus the size its value reports via [ByteSize].
//!
//! The store itself performs no locking. A [Group](crate::group::Group) wraps its store in a
//! mutex and only holds that lock for the duration of a single store operation.
mod lru_cache;

pub use lru_cache::ByteSize;
pub use lru_cache::EvictionCallback;
pub use lru_cache::LRUCache;
