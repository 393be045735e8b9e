//! Provides the cache group which orchestrates local cache, peers and loader.
//!
//! A [Group] is a named cache namespace. Each lookup runs through the following steps:
//! 1. An empty key is rejected right away.
//! 2. The local LRU store is consulted. A hit is returned directly.
//! 3. Otherwise a fill is started. Concurrent fills for the same key are coalesced so that only
//!    one of them is actually executed and all callers receive its result:
//!    * If peers are registered and a remote peer owns the key, the value is fetched from
//!      there. Such values are **not** stored locally, as the owning peer is the cache of record.
//!      If the peer fails, this is logged and the fill continues with the next step.
//!    * Otherwise the [Loader] of the group is invoked. Its result is stored in the local cache
//!      and returned.
//!
//! # Example
//! ```
//! # use ganymede::group::Group;
//! # #[tokio::main]
//! # async fn main() {
//! let group = Group::new("scores", 2048, |key: String| async move {
//!     match key.as_str() {
//!         "Tom" => Ok(b"630".to_vec()),
//!         _ => Err(anyhow::anyhow!("{} not exist", key)),
//!     }
//! });
//!
//! assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
//! assert_eq!(group.get("Bob").await.unwrap_err().to_string(), "Bob not exist");
//! # }
//! ```
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;

use async_trait::async_trait;

use crate::byteview::ByteView;
use crate::error::{CacheError, CacheResult};
use crate::lru::LRUCache;
use crate::peers::{PeerGetter, PeerPicker};
use crate::protocol::GetRequest;
use crate::singleflight::SingleFlight;

/// Fetches the value of a key from the source of truth once it isn't cached anywhere.
///
/// Any closure or async fn taking the key as **String** and yielding the raw bytes implements
/// this trait, so a loader can either be a plain function or an object carrying its own state.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Loads the value of the given key.
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

#[async_trait]
impl<F, Fut> Loader for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
{
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (self)(key.to_owned()).await
    }
}

/// Records some counters which describe the utilization of a group.
#[derive(Default)]
pub struct GroupStats {
    gets: AtomicU64,
    cache_hits: AtomicU64,
    loads: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
    local_loads: AtomicU64,
    local_load_errors: AtomicU64,
    server_requests: AtomicU64,
    load_micros: AtomicU64,
}

impl GroupStats {
    /// Returns the number of lookups (excluding rejected ones with an empty key).
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Returns the number of lookups served by the local cache.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Returns the number of fills which were actually executed (after coalescing).
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Returns the number of values successfully fetched from remote peers.
    pub fn peer_loads(&self) -> u64 {
        self.peer_loads.load(Ordering::Relaxed)
    }

    /// Returns the number of failed peer requests.
    pub fn peer_errors(&self) -> u64 {
        self.peer_errors.load(Ordering::Relaxed)
    }

    /// Returns the number of loader invocations.
    pub fn local_loads(&self) -> u64 {
        self.local_loads.load(Ordering::Relaxed)
    }

    /// Returns the number of failed loader invocations.
    pub fn local_load_errors(&self) -> u64 {
        self.local_load_errors.load(Ordering::Relaxed)
    }

    /// Returns the number of requests which were received from other peers.
    pub fn server_requests(&self) -> u64 {
        self.server_requests.load(Ordering::Relaxed)
    }

    /// Returns the total time spent in the loader in microseconds.
    pub fn load_micros(&self) -> u64 {
        self.load_micros.load(Ordering::Relaxed)
    }

    fn inc(counter: &AtomicU64) {
        let _ = counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Represents a named cache namespace.
pub struct Group {
    name: String,
    loader: Box<dyn Loader>,
    main_cache: Mutex<LRUCache<ByteView>>,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    flight: SingleFlight<CacheResult<ByteView>>,
    stats: GroupStats,
}

impl Group {
    /// Creates a new group whose local cache may occupy up to **max_memory** bytes.
    ///
    /// A **max_memory** of 0 disables eviction. Note that most probably groups are created via
    /// [Groups::new_group](crate::groups::Groups::new_group) so that peers can find them.
    pub fn new(name: impl Into<String>, max_memory: usize, loader: impl Loader + 'static) -> Self {
        Group {
            name: name.into(),
            loader: Box::new(loader),
            main_cache: Mutex::new(LRUCache::new(max_memory)),
            peers: OnceLock::new(),
            flight: SingleFlight::new(),
            stats: GroupStats::default(),
        }
    }

    /// Returns the name of the group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provides access to the utilization counters.
    pub fn stats(&self) -> &GroupStats {
        &self.stats
    }

    /// Returns the number of locally cached entries.
    pub fn cache_len(&self) -> usize {
        self.cache().len()
    }

    /// Returns the number of bytes occupied by the locally cached keys and values.
    pub fn cache_bytes(&self) -> usize {
        self.cache().allocated_memory()
    }

    /// Attaches the peer picker which determines the owner of each key.
    ///
    /// This can only be done once. Any further attempt is rejected with
    /// [CacheError::Setup](CacheError::Setup) as it indicates a wiring bug.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) -> CacheResult<()> {
        self.peers.set(peers).map_err(|_| {
            CacheError::Setup(format!(
                "Peers of group '{}' have already been registered.",
                self.name
            ))
        })
    }

    /// Fetches the value for the given key.
    pub async fn get(&self, key: &str) -> CacheResult<ByteView> {
        if key.is_empty() {
            return Err(CacheError::InvalidArgument("key is required".to_owned()));
        }

        GroupStats::inc(&self.stats.gets);
        if let Some(value) = self.lookup_cache(key) {
            GroupStats::inc(&self.stats.cache_hits);
            log::debug!("[{}] Cache hit for '{}'.", self.name, key);
            return Ok(value);
        }

        self.load(key).await
    }

    /// Fetches the value for a request which was received from another peer.
    ///
    /// This behaves exactly like [get](Group::get) but is tracked separately in the stats.
    pub async fn serve(&self, key: &str) -> CacheResult<ByteView> {
        GroupStats::inc(&self.stats.server_requests);
        self.get(key).await
    }

    async fn load(&self, key: &str) -> CacheResult<ByteView> {
        self.flight
            .work(key, || async {
                // A previous fill might have completed since we checked the cache...
                if let Some(value) = self.lookup_cache(key) {
                    return Ok(value);
                }

                GroupStats::inc(&self.stats.loads);
                if let Some(peer) = self.peers.get().and_then(|peers| peers.pick_peer(key)) {
                    match self.get_from_peer(peer.as_ref(), key).await {
                        Ok(value) => return Ok(value),
                        Err(error) => {
                            GroupStats::inc(&self.stats.peer_errors);
                            log::warn!(
                                "[{}] Failed to fetch '{}' from peer: {}. Loading locally...",
                                self.name,
                                key,
                                error
                            );
                        }
                    }
                }

                self.get_locally(key).await
            })
            .await
    }

    async fn get_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> CacheResult<ByteView> {
        let response = peer.get(&GetRequest::new(self.name.as_str(), key)).await?;
        GroupStats::inc(&self.stats.peer_loads);

        Ok(ByteView::from(response.value))
    }

    async fn get_locally(&self, key: &str) -> CacheResult<ByteView> {
        GroupStats::inc(&self.stats.local_loads);
        let watch = Instant::now();
        let result = self.loader.load(key).await;
        let _ = self
            .stats
            .load_micros
            .fetch_add(watch.elapsed().as_micros() as u64, Ordering::Relaxed);

        match result {
            Ok(data) => {
                let value = ByteView::from(data);
                self.populate_cache(key, value.clone());
                Ok(value)
            }
            Err(error) => {
                GroupStats::inc(&self.stats.local_load_errors);
                Err(CacheError::from(error))
            }
        }
    }

    fn lookup_cache(&self, key: &str) -> Option<ByteView> {
        self.cache().get(key).cloned()
    }

    fn populate_cache(&self, key: &str, value: ByteView) {
        self.cache().put(key.to_owned(), value);
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, LRUCache<ByteView>> {
        self.main_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
