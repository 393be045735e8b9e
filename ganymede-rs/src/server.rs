//! Contains the HTTP server which exposes an [Endpoint] on a TCP port.
//!
//! The server reads its address from the config section it was created for (e.g.
//! **server.host** and **server.port**). If binding fails, as an old instance is still
//! shutting down, it keeps retrying every 500ms so that the port is handed over with minimal
//! downtime. Each accepted connection is driven by hyper's HTTP/1 connection handler and every
//! request is passed to the endpoint.
//!
//! # Example
//!
//! ```no_run
//! use ganymede::builder::Builder;
//! use ganymede::config::Config;
//! use ganymede::server::Server;
//!
//! #[tokio::main]
//! async fn main() {
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     // Use another port than a production instance...
//!     platform
//!         .require::<Config>()
//!         .load_from_string("server:\n    port: 18001")
//!         .unwrap();
//!
//!     platform.require::<Server>().event_loop().await;
//! }
//! ```
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Request, Response};
use tokio::net::{TcpListener, TcpStream};

use crate::config::Config;
use crate::platform::Platform;
use crate::spawn;

/// Specifies the timeout when waiting for a new incoming connection.
///
/// The accept call is interrupted periodically so that a terminated platform is noticed.
const CONNECT_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Specifies the interval in which binding the server socket is retried.
const BIND_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Handles the HTTP requests received by a [Server].
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Returns a short name used in log messages.
    fn name(&self) -> &str;

    /// Computes the response for the given request.
    async fn handle(&self, request: Request<Body>) -> Response<Body>;
}

/// Accepts TCP connections and dispatches their requests to an endpoint.
pub struct Server {
    platform: Arc<Platform>,
    endpoint: Arc<dyn Endpoint>,
    section: String,
    default_port: u16,
    running: AtomicBool,
}

impl Server {
    /// Creates a server for the given endpoint.
    ///
    /// The address is read from **<section>.host** (default: 0.0.0.0) and **<section>.port**
    /// (default: **default_port**). Note that this doesn't start the server. This has to be done
    /// via [event_loop](Server::event_loop).
    pub fn new(
        platform: &Arc<Platform>,
        endpoint: Arc<dyn Endpoint>,
        section: &str,
        default_port: u16,
    ) -> Arc<Self> {
        Arc::new(Server {
            platform: platform.clone(),
            endpoint,
            section: section.to_owned(),
            default_port,
            running: AtomicBool::new(false),
        })
    }

    /// Creates the server which talks to other peers and registers it in the platform.
    ///
    /// This uses the **server** config section and port 8001 as default. Note that this is
    /// called by the [Builder](crate::builder::Builder) unless disabled.
    pub fn install(platform: &Arc<Platform>, endpoint: Arc<dyn Endpoint>) -> Arc<Self> {
        let server = Server::new(platform, endpoint, "server", 8001);
        platform.register::<Server>(server.clone());

        server
    }

    /// Determines if the server socket is currently open.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Determines the address to bind to based on the current config.
    pub fn address(&self) -> String {
        let (host, port) = match self.platform.find::<Config>() {
            Some(config) => {
                let handle = config.current();
                (
                    handle
                        .query(format!("{}.host", self.section))
                        .as_str()
                        .unwrap_or("0.0.0.0")
                        .to_owned(),
                    handle
                        .query(format!("{}.port", self.section))
                        .as_i64()
                        .filter(|port| *port > 0 && *port <= u16::MAX as i64)
                        .map(|port| port as u16)
                        .unwrap_or(self.default_port),
                )
            }
            None => ("0.0.0.0".to_owned(), self.default_port),
        };

        format!("{}:{}", host, port)
    }

    /// Starts the event loop in a separate task.
    pub fn fork(server: &Arc<Server>) {
        let cloned_server = server.clone();
        spawn!(async move {
            cloned_server.event_loop().await;
        });
    }

    /// Starts the event loop in a separate task and waits until the socket is open.
    ///
    /// This is most probably used by tests.
    pub async fn fork_and_await(server: &Arc<Server>) {
        Server::fork(server);

        while !server.is_running() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Binds the server socket and serves incoming connections until the platform is
    /// terminated.
    pub async fn event_loop(&self) {
        let address = self.address();
        let mut last_bind_error_reported: Option<Instant> = None;

        while self.platform.is_running() {
            match TcpListener::bind(&address).await {
                Ok(listener) => {
                    log::info!(
                        "Opened {} server socket on {}...",
                        self.endpoint.name(),
                        &address
                    );
                    self.running.store(true, Ordering::Release);
                    self.server_loop(&listener).await;
                    self.running.store(false, Ordering::Release);
                    log::info!(
                        "Closing {} server socket on {}.",
                        self.endpoint.name(),
                        &address
                    );
                }
                Err(error) => {
                    // Retrying happens every 500ms, but we only complain every 5s...
                    if last_bind_error_reported
                        .map(|reported| reported.elapsed().as_secs() >= 5)
                        .unwrap_or(true)
                    {
                        log::error!(
                            "Cannot open server address {}: {}. Retrying every 500ms...",
                            &address,
                            error
                        );
                        last_bind_error_reported = Some(Instant::now());
                    }
                    tokio::time::sleep(BIND_RETRY_INTERVAL).await;
                }
            }
        }
    }

    async fn server_loop(&self, listener: &TcpListener) {
        while self.platform.is_running() {
            // An Err here only indicates the timeout, which is just there to re-check
            // whether the platform is still running...
            if let Ok(accepted) = tokio::time::timeout(CONNECT_WAIT_TIMEOUT, listener.accept()).await
            {
                match accepted {
                    Ok((stream, _)) => self.handle_new_connection(stream),
                    Err(error) => {
                        log::error!("Failed to accept a connection: {}", error);
                        return;
                    }
                }
            }
        }
    }

    fn handle_new_connection(&self, stream: TcpStream) {
        let endpoint = self.endpoint.clone();
        spawn!(async move {
            let _ = stream.set_nodelay(true);
            let peer_address = stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "<unknown>".to_owned());
            log::debug!("Opened connection from {}...", peer_address);

            let service = service_fn(move |request: Request<Body>| {
                let endpoint = endpoint.clone();
                async move { Ok::<_, Infallible>(endpoint.handle(request).await) }
            });

            if let Err(error) = Http::new()
                .http1_only(true)
                .serve_connection(stream, service)
                .await
            {
                log::debug!("An error occurred in connection {}: {}", peer_address, error);
            }

            log::debug!("Closed connection to {}.", peer_address);
        });
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::group::Group;
    use crate::groups::Groups;
    use crate::peers::PeerPicker;
    use crate::platform::Platform;
    use crate::pool::HttpPool;
    use crate::server::Server;
    use crate::testing::test_async;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const NODE_A: &str = "http://127.0.0.1:18401";
    const NODE_B: &str = "http://127.0.0.1:18402";

    /// Creates a node whose loader prefixes each value with the given label.
    fn node(label: &'static str, calls: Arc<AtomicUsize>) -> (Arc<Groups>, Arc<Group>) {
        let groups = Arc::new(Groups::new());
        let group = groups
            .new_group("scores", 0, move |key: String| {
                let calls = calls.clone();
                async move {
                    let _ = calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(format!("{}:{}", label, key).into_bytes())
                }
            })
            .unwrap();

        (groups, group)
    }

    /// Finds a key which node A has to fetch from node B.
    fn remote_key(pool: &HttpPool) -> String {
        (0..1000)
            .map(|i| format!("key-{}", i))
            .find(|key| pool.pick_peer(key).is_some())
            .unwrap()
    }

    #[test]
    fn values_are_fetched_from_the_owning_peer() {
        log::info!("Acquiring shared resources...");
        let _guard = crate::testing::SHARED_TEST_RESOURCES.lock().unwrap();
        log::info!("Successfully acquired shared resources.");

        test_async(async {
            // Start node B which serves its group via HTTP...
            let platform = Platform::new();
            let config = Arc::new(Config::new("test.yml"));
            config
                .load_from_string("server:\n    host: 127.0.0.1\n    port: 18402")
                .unwrap();
            platform.register(config);

            let b_calls = Arc::new(AtomicUsize::new(0));
            let (b_groups, _) = node("B", b_calls.clone());
            let b_pool = Arc::new(HttpPool::new(NODE_B, b_groups));
            b_pool.set(&[NODE_A, NODE_B]);
            let server = Server::install(&platform, b_pool.clone());
            Server::fork_and_await(&server).await;

            // Setup node A which only talks to B as client...
            let a_calls = Arc::new(AtomicUsize::new(0));
            let (a_groups, a_group) = node("A", a_calls.clone());
            let a_pool = Arc::new(
                HttpPool::new(NODE_A, a_groups).with_timeout(Duration::from_secs(5)),
            );
            a_pool.set(&[NODE_A, NODE_B]);
            a_group.register_peers(a_pool.clone()).unwrap();

            let key = remote_key(&a_pool);
            let value = a_group.get(&key).await.unwrap();
            assert_eq!(value.to_string(), format!("B:{}", key));
            assert_eq!(a_calls.load(Ordering::SeqCst), 0);
            assert_eq!(b_calls.load(Ordering::SeqCst), 1);

            // B caches the value, A doesn't...
            let _ = a_group.get(&key).await.unwrap();
            assert_eq!(b_calls.load(Ordering::SeqCst), 1);
            assert_eq!(a_group.cache_len(), 0);

            platform.terminate();
            tokio::time::sleep(Duration::from_millis(700)).await;
            assert!(!server.is_running());
        });
    }

    #[test]
    fn unreachable_peers_fall_back_to_the_loader() {
        test_async(async {
            // Nobody listens on the port of node B here...
            let calls = Arc::new(AtomicUsize::new(0));
            let (groups, group) = node("A", calls.clone());
            let pool = Arc::new(
                HttpPool::new(NODE_A, groups).with_timeout(Duration::from_secs(2)),
            );
            pool.set(&[NODE_A, "http://127.0.0.1:1"]);
            group.register_peers(pool.clone()).unwrap();

            let key = remote_key(&pool);
            assert_eq!(
                group.get(&key).await.unwrap().to_string(),
                format!("A:{}", key)
            );
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(group.stats().peer_errors(), 1);
            assert_eq!(group.cache_len(), 1);
        });
    }
}
