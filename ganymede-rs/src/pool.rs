//! Provides the HTTP based peer transport.
//!
//! An [HttpPool] plays two roles:
//! * It is the [PeerPicker] of the local groups. Once the set of peers is known, it places them
//!   onto a [HashRing] and hands out an [HttpGetter] for the owner of a key, unless the local
//!   node owns it.
//! * It answers the requests of other peers. Each request has the form
//!   `GET <base_path><group>/<key>` where group and key are percent-encoded. The value is
//!   returned as bincode encoded [GetResponse] (**application/octet-stream**).
//!
//! | Status | Meaning                                      |
//! |--------|----------------------------------------------|
//! | 200    | The body contains the encoded value          |
//! | 400    | The path is outside of the base path or malformed |
//! | 404    | The group is unknown                         |
//! | 405    | Only GET requests are supported              |
//! | 500    | The value couldn't be loaded (body contains the error) |
//!
//! # Example
//! ```no_run
//! # use ganymede::groups::Groups;
//! # use ganymede::pool::HttpPool;
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! let groups = Arc::new(Groups::new());
//! let pool = Arc::new(
//!     HttpPool::new("http://localhost:8001", groups.clone())
//!         .with_replicas(50)
//!         .with_timeout(Duration::from_secs(2)),
//! );
//! pool.set(&[
//!     "http://localhost:8001",
//!     "http://localhost:8002",
//!     "http://localhost:8003",
//! ]);
//!
//! let scores = groups
//!     .new_group("scores", 2 << 10, |key: String| async move {
//!         Ok::<_, anyhow::Error>(key.into_bytes())
//!     })
//!     .unwrap();
//! scores.register_peers(pool.clone()).unwrap();
//! ```
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Client, Method, Request, Response, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use pct_str::{PctStr, PctString, UriReserved};

use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use crate::groups::Groups;
use crate::peers::{PeerGetter, PeerPicker};
use crate::platform::Platform;
use crate::protocol::{GetRequest, GetResponse};
use crate::ring::HashRing;
use crate::server::Endpoint;

/// Contains the path prefix under which peers talk to each other.
pub const DEFAULT_BASE_PATH: &str = "/_ganymede/";

/// Contains the number of virtual points per peer on the hash ring.
pub const DEFAULT_REPLICAS: usize = 50;

const OCTET_STREAM: &str = "application/octet-stream";

/// Keeps the peer set of this node and serves the requests of other peers.
pub struct HttpPool {
    self_url: String,
    base_path: String,
    replicas: usize,
    timeout: Option<Duration>,
    groups: Arc<Groups>,
    peers: Mutex<PeerSet>,
}

struct PeerSet {
    ring: HashRing,
    getters: HashMap<String, Arc<HttpGetter>>,
}

impl HttpPool {
    /// Creates a pool for the node reachable via the given base URL (e.g.
    /// "http://localhost:8001").
    ///
    /// The URL has to match the entry of this node in the list passed to [set](HttpPool::set),
    /// as this is how the pool recognizes keys it owns itself.
    pub fn new(self_url: impl Into<String>, groups: Arc<Groups>) -> Self {
        HttpPool {
            self_url: self_url.into(),
            base_path: DEFAULT_BASE_PATH.to_owned(),
            replicas: DEFAULT_REPLICAS,
            timeout: None,
            groups,
            peers: Mutex::new(PeerSet {
                ring: HashRing::new(DEFAULT_REPLICAS),
                getters: HashMap::new(),
            }),
        }
    }

    /// Specifies the path prefix used to talk to peers.
    ///
    /// Leading and trailing slashes are added if missing.
    pub fn with_base_path(mut self, base_path: &str) -> Self {
        let trimmed = base_path.trim_matches('/');
        self.base_path = if trimmed.is_empty() {
            "/".to_owned()
        } else {
            format!("/{}/", trimmed)
        };
        self
    }

    /// Specifies the number of virtual points per peer.
    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas.max(1);
        self
    }

    /// Specifies a timeout for each request sent to another peer.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the base URL of this node.
    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    /// Returns the path prefix used to talk to peers.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Replaces the set of peers (which should include this node itself).
    ///
    /// The hash ring and all getters are rebuilt from scratch. There is no way to remove a
    /// single peer, as a changed peer set requires a new ring anyway.
    pub fn set<S: AsRef<str>>(&self, peers: &[S]) {
        let mut ring = HashRing::new(self.replicas);
        ring.add(peers);

        let getters = peers
            .iter()
            .map(|peer| {
                let peer = peer.as_ref();
                (
                    peer.to_owned(),
                    Arc::new(HttpGetter::new(
                        format!("{}{}", peer.trim_end_matches('/'), self.base_path),
                        self.timeout,
                    )),
                )
            })
            .collect::<HashMap<_, _>>();

        log::info!(
            "[{}] Using {} peer(s): {}",
            self.self_url,
            getters.len(),
            peers
                .iter()
                .map(|peer| peer.as_ref())
                .collect::<Vec<_>>()
                .join(", ")
        );

        *self.peers.lock().unwrap_or_else(PoisonError::into_inner) = PeerSet { ring, getters };
    }

    /// Lists the base URLs of all known peers in alphabetical order.
    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self
            .peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .getters
            .keys()
            .cloned()
            .collect();
        peers.sort();

        peers
    }

    /// Answers a request sent by another peer.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        if request.method() != Method::GET {
            return text_response(StatusCode::METHOD_NOT_ALLOWED, "Only GET is supported.");
        }

        let path = request.uri().path();
        let (group_name, key) = match path
            .strip_prefix(self.base_path.as_str())
            .ok_or_else(|| CacheError::InvalidArgument(format!("Unexpected path: {}", path)))
            .and_then(parse_path)
        {
            Ok(group_and_key) => group_and_key,
            Err(error) => return text_response(StatusCode::BAD_REQUEST, error.to_string()),
        };

        log::debug!("[{}] GET {}/{}", self.self_url, group_name, key);

        let group = match self.groups.get_group(&group_name) {
            Some(group) => group,
            None => {
                return text_response(
                    StatusCode::NOT_FOUND,
                    CacheError::NoSuchGroup(group_name).to_string(),
                )
            }
        };

        let encoded = group.serve(&key).await.and_then(|value| {
            GetResponse {
                value: value.byte_slice(),
            }
            .encode()
            .map_err(CacheError::from)
        });

        match encoded {
            Ok(body) => {
                let mut response = Response::new(Body::from(body));
                let _ = response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
                response
            }
            Err(error) => text_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
        }
    }
}

/// Creates a pool based on the **peers** section of the config and registers it in the platform.
///
/// The following keys are used:
/// * **peers.self**: the base URL of this node (default: http://localhost:<server.port>)
/// * **peers.base_path**: the path prefix (default: /_ganymede/)
/// * **peers.replicas**: virtual points per peer (default: 50)
/// * **peers.timeout**: an optional timeout per peer request like "2s"
///
/// Invalid values are logged and replaced by their defaults. Note that the peers themselves
/// still have to be provided via [set](HttpPool::set), see [configured_peers].
pub fn install(platform: &Arc<Platform>, groups: Arc<Groups>) -> Arc<HttpPool> {
    let config = platform.find::<Config>().map(|config| config.current());
    let query = |path: &str| config.as_ref().map(|handle| handle.query(path).clone());

    let port = query("server.port")
        .and_then(|port| port.as_i64())
        .unwrap_or(8001);
    let self_url = query("peers.self")
        .and_then(|url| url.as_str().map(|url| url.to_owned()))
        .unwrap_or_else(|| format!("http://localhost:{}", port));

    let mut pool = HttpPool::new(self_url, groups);
    if let Some(base_path) = query("peers.base_path")
        .and_then(|base_path| base_path.as_str().map(|base_path| base_path.to_owned()))
    {
        pool = pool.with_base_path(&base_path);
    }
    match query("peers.replicas").and_then(|replicas| replicas.as_i64()) {
        Some(replicas) if replicas > 0 => pool = pool.with_replicas(replicas as usize),
        Some(replicas) => log::warn!(
            "Ignoring invalid peers.replicas: {}. Using {}.",
            replicas,
            DEFAULT_REPLICAS
        ),
        None => (),
    }
    if let Some(timeout) = query("peers.timeout").and_then(|timeout| match timeout {
        yaml_rust::Yaml::Integer(millis) => Some(millis.to_string()),
        other => other.as_str().map(|timeout| timeout.to_owned()),
    }) {
        match crate::fmt::parse_duration(&timeout) {
            Ok(timeout) => pool = pool.with_timeout(timeout),
            Err(error) => log::warn!("Ignoring invalid peers.timeout: {}", error),
        }
    }

    let pool = Arc::new(pool);
    platform.register::<HttpPool>(pool.clone());

    pool
}

/// Reads the base URLs of all peers from **peers.addresses**.
///
/// If no peers are configured, the node only knows itself and serves everything locally.
pub fn configured_peers(platform: &Platform) -> Vec<String> {
    let peers: Vec<String> = platform
        .find::<Config>()
        .and_then(|config| {
            config.current().query("peers.addresses").as_vec().map(|addresses| {
                addresses
                    .iter()
                    .filter_map(|address| address.as_str().map(|address| address.to_owned()))
                    .collect()
            })
        })
        .unwrap_or_default();

    if peers.is_empty() {
        platform
            .find::<HttpPool>()
            .map(|pool| vec![pool.self_url().to_owned()])
            .unwrap_or_default()
    } else {
        peers
    }
}

/// Splits "<group>/<key>" and decodes both parts.
fn parse_path(path: &str) -> CacheResult<(String, String)> {
    let (group, key) = path
        .split_once('/')
        .ok_or_else(|| CacheError::InvalidArgument("Bad request: expected <group>/<key>".to_owned()))?;

    let group = decode_segment(group)?;
    let key = decode_segment(key)?;
    if group.is_empty() || key.is_empty() {
        return Err(CacheError::InvalidArgument(
            "Bad request: expected <group>/<key>".to_owned(),
        ));
    }

    Ok((group, key))
}

fn decode_segment(segment: &str) -> CacheResult<String> {
    PctStr::new(segment)
        .map(|decoded| decoded.decode())
        .map_err(|_| CacheError::InvalidArgument(format!("Malformed path segment: {}", segment)))
}

fn encode_segment(segment: &str) -> String {
    PctString::encode(segment.chars(), UriReserved::Any).into_string()
}

fn text_response(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(message.into()));
    *response.status_mut() = status;

    response
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
        let owner = peers.ring.get(key)?;
        if owner == self.self_url {
            return None;
        }

        log::debug!("[{}] Picked peer {} for '{}'.", self.self_url, owner, key);
        let getter: Arc<dyn PeerGetter> = peers.getters.get(owner)?.clone();
        Some(getter)
    }
}

#[async_trait]
impl Endpoint for HttpPool {
    fn name(&self) -> &str {
        "peer"
    }

    async fn handle(&self, request: Request<Body>) -> Response<Body> {
        HttpPool::handle(self, request).await
    }
}

/// Fetches values from a single remote peer via HTTP.
pub struct HttpGetter {
    base_url: String,
    timeout: Option<Duration>,
    client: Client<HttpsConnector<HttpConnector>>,
}

impl HttpGetter {
    /// Creates a getter for the given URL which already contains the base path (e.g.
    /// "http://localhost:8002/_ganymede/").
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Self {
        HttpGetter {
            base_url: base_url.into(),
            timeout,
            client: Client::builder().build::<_, Body>(HttpsConnector::new()),
        }
    }

    /// Returns the URL under which the given value is requested.
    pub fn url_for(&self, request: &GetRequest) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            encode_segment(&request.group),
            encode_segment(&request.key)
        )
    }

    async fn fetch(&self, url: &str) -> anyhow::Result<GetResponse> {
        let uri = Uri::from_str(url).context("Invalid uri")?;
        let response = self.client.get(uri).await.context("Failed to reach peer")?;

        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .context("Failed to read response body")?;

        if status != StatusCode::OK {
            return Err(anyhow::anyhow!(
                "server returned: {} - {}",
                status,
                String::from_utf8_lossy(&body).trim()
            ));
        }

        GetResponse::decode(&body)
    }
}

#[async_trait]
impl PeerGetter for HttpGetter {
    async fn get(&self, request: &GetRequest) -> CacheResult<GetResponse> {
        let url = self.url_for(request);
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.fetch(&url))
                .await
                .unwrap_or_else(|_| Err(anyhow::anyhow!("no response within {:?}", timeout))),
            None => self.fetch(&url).await,
        };

        result.map_err(|error| CacheError::Transport(format!("{} ({:#})", url, error)))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::groups::Groups;
    use crate::peers::PeerPicker;
    use crate::platform::Platform;
    use crate::pool::{configured_peers, HttpGetter, HttpPool};
    use crate::protocol::{GetRequest, GetResponse};
    use crate::ring::HashRing;
    use hyper::{Body, Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;

    fn scores() -> Arc<Groups> {
        let groups = Arc::new(Groups::new());
        let _ = groups
            .new_group("scores", 0, |key: String| async move {
                match key.as_str() {
                    "Tom" => Ok(b"630".to_vec()),
                    "a key/with spaces" => Ok(b"42".to_vec()),
                    _ => Err(anyhow::anyhow!("{} not exist", key)),
                }
            })
            .unwrap();

        groups
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_of(response: hyper::Response<Body>) -> Vec<u8> {
        hyper::body::to_bytes(response.into_body())
            .await
            .unwrap()
            .to_vec()
    }

    #[test]
    fn values_are_served_as_encoded_responses() {
        crate::testing::test_async(async {
            let pool = HttpPool::new("http://localhost:8001", scores());

            let response = pool.handle(get("/_ganymede/scores/Tom")).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()["content-type"],
                "application/octet-stream"
            );
            let body = body_of(response).await;
            assert_eq!(GetResponse::decode(&body).unwrap().value, b"630".to_vec());

            // Group and key are percent-decoded...
            let response = pool
                .handle(get("/_ganymede/scores/a%20key%2Fwith%20spaces"))
                .await;
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_of(response).await;
            assert_eq!(GetResponse::decode(&body).unwrap().value, b"42".to_vec());
        });
    }

    #[test]
    fn failures_are_reported_via_status_codes() {
        crate::testing::test_async(async {
            let pool = HttpPool::new("http://localhost:8001", scores());

            let response = pool.handle(get("/_ganymede/unknown/Tom")).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);

            let response = pool.handle(get("/other/scores/Tom")).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let response = pool.handle(get("/_ganymede/scores")).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let response = pool.handle(get("/_ganymede/scores/")).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let response = pool
                .handle(
                    Request::builder()
                        .method("POST")
                        .uri("/_ganymede/scores/Tom")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

            let response = pool.handle(get("/_ganymede/scores/Bob")).await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body_of(response).await, b"Bob not exist".to_vec());
        });
    }

    #[test]
    fn custom_base_paths_are_normalized() {
        let pool = HttpPool::new("http://localhost:8001", Arc::new(Groups::new()))
            .with_base_path("cache");
        assert_eq!(pool.base_path(), "/cache/");
    }

    #[test]
    fn the_local_node_is_never_picked() {
        let peers = ["http://localhost:8001", "http://localhost:8002"];
        let pool = HttpPool::new("http://localhost:8001", Arc::new(Groups::new()));

        // Without peers, everything is served locally...
        assert!(pool.pick_peer("Tom").is_none());

        pool.set(&peers);
        assert_eq!(pool.peers(), vec![peers[0].to_owned(), peers[1].to_owned()]);

        let mut ring = HashRing::new(50);
        ring.add(&peers);
        for i in 0..200 {
            let key = format!("key-{}", i);
            let picked = pool.pick_peer(&key);
            if ring.get(&key) == Some(peers[0]) {
                assert!(picked.is_none());
            } else {
                assert!(picked.is_some());
            }
        }
    }

    #[test]
    fn pools_are_configured_via_the_peers_section() {
        let platform = Platform::new();
        let config = Arc::new(Config::new("test.yml"));
        config
            .load_from_string(
                "
server:
    port: 8002
peers:
    base_path: cache
    replicas: 10
    timeout: 2s
    addresses:
        - http://localhost:8001
        - http://localhost:8002
",
            )
            .unwrap();
        platform.register(config);

        let pool = crate::pool::install(&platform, Arc::new(Groups::new()));
        assert_eq!(pool.self_url(), "http://localhost:8002");
        assert_eq!(pool.base_path(), "/cache/");
        assert_eq!(pool.replicas, 10);
        assert_eq!(pool.timeout, Some(Duration::from_secs(2)));
        assert!(platform.find::<HttpPool>().is_some());
        assert_eq!(
            configured_peers(&platform),
            vec![
                "http://localhost:8001".to_owned(),
                "http://localhost:8002".to_owned()
            ]
        );
    }

    #[test]
    fn a_node_without_peers_only_knows_itself() {
        let platform = Platform::new();
        let pool = crate::pool::install(&platform, Arc::new(Groups::new()));
        assert_eq!(pool.self_url(), "http://localhost:8001");
        assert_eq!(
            configured_peers(&platform),
            vec!["http://localhost:8001".to_owned()]
        );
    }

    #[test]
    fn getters_encode_group_and_key() {
        let getter = HttpGetter::new("http://localhost:8002/_ganymede/", None);
        assert_eq!(
            getter.url_for(&GetRequest::new("scores", "a key/with spaces")),
            "http://localhost:8002/_ganymede/scores/a%20key%2Fwith%20spaces"
        );
    }
}
