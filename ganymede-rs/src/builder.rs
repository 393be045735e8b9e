//! Provides a builder which sets up the components of a node.
//!
//! Each component can be enabled selectively, which is mostly useful for tests. A production
//! node most probably uses [Builder::enable_all].
//!
//! # Example
//! ```no_run
//! # use ganymede::builder::Builder;
//! # use ganymede::groups::Groups;
//! # use ganymede::pool::HttpPool;
//! # use ganymede::server::Server;
//! #[tokio::main]
//! async fn main() {
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     // Create the groups of this node...
//!     let pool = platform.require::<HttpPool>();
//!     let scores = platform
//!         .require::<Groups>()
//!         .new_group("scores", 2 << 10, |key: String| async move {
//!             Ok::<_, anyhow::Error>(key.into_bytes())
//!         })
//!         .unwrap();
//!
//!     // ..announce the peers and attach them to each group...
//!     pool.set(&ganymede::pool::configured_peers(&platform));
//!     scores.register_peers(pool).unwrap();
//!
//!     // ..and start serving requests of other peers.
//!     platform.require::<Server>().event_loop().await;
//! }
//! ```
use std::sync::Arc;

use crate::groups::Groups;
use crate::platform::Platform;
use crate::server::Server;
use crate::{init_logging, GANYMEDE_REVISION, GANYMEDE_VERSION};

/// Initializes a node by creating and registering the enabled components.
#[derive(Default)]
pub struct Builder {
    setup_logging: bool,
    enable_signals: bool,
    setup_config: bool,
    setup_groups: bool,
    setup_server: bool,
}

impl Builder {
    /// Creates a new builder with all components disabled.
    pub fn new() -> Self {
        Builder::default()
    }

    /// Enables all components.
    pub fn enable_all(mut self) -> Self {
        self.setup_logging = true;
        self.enable_signals = true;
        self.setup_config = true;
        self.setup_groups = true;
        self.setup_server = true;

        self
    }

    /// Initializes **simplelog** to log to stdout.
    pub fn enable_logging(mut self) -> Self {
        self.setup_logging = true;
        self
    }

    /// Disables the logging setup after [enable_all()](Builder::enable_all) has been used.
    pub fn disable_logging(mut self) -> Self {
        self.setup_logging = false;
        self
    }

    /// Terminates the platform on **CTRL+C**, **SIGHUP** or **SIGTERM**.
    ///
    /// For more details see: [signals](crate::signals)
    pub fn enable_signals(mut self) -> Self {
        self.enable_signals = true;
        self
    }

    /// Disables the signal listener after [enable_all()](Builder::enable_all) has been used.
    pub fn disable_signals(mut self) -> Self {
        self.enable_signals = false;
        self
    }

    /// Installs a [Config](crate::config::Config) and loads **config/settings.yml**.
    pub fn enable_config(mut self) -> Self {
        self.setup_config = true;
        self
    }

    /// Disables the config after [enable_all()](Builder::enable_all) has been used.
    pub fn disable_config(mut self) -> Self {
        self.setup_config = false;
        self
    }

    /// Installs an empty [Groups] registry.
    pub fn enable_groups(mut self) -> Self {
        self.setup_groups = true;
        self
    }

    /// Disables the group registry after [enable_all()](Builder::enable_all) has been used.
    ///
    /// Note that the registry is still created if the server is enabled, as the pool needs it.
    pub fn disable_groups(mut self) -> Self {
        self.setup_groups = false;
        self
    }

    /// Installs the [HttpPool](crate::pool::HttpPool) and the [Server] which talks to other
    /// peers.
    ///
    /// Note that the main event loop still has to be started via
    /// `platform.require::<Server>().event_loop().await`.
    pub fn enable_server(mut self) -> Self {
        self.setup_server = true;
        self
    }

    /// Disables the peer server after [enable_all()](Builder::enable_all) has been used.
    pub fn disable_server(mut self) -> Self {
        self.setup_server = false;
        self
    }

    /// Builds the [Platform] with all enabled components being registered.
    pub async fn build(self) -> Arc<Platform> {
        let platform = Platform::new();

        if self.setup_logging {
            init_logging();
        }

        log::info!(
            "||. GANYMEDE (v {} - rev {}) running on {} core(s) in {} CPU(s)",
            GANYMEDE_VERSION,
            GANYMEDE_REVISION,
            num_cpus::get(),
            num_cpus::get_physical()
        );

        if self.enable_signals {
            crate::signals::install(platform.clone());
        }

        if self.setup_config {
            let _ = crate::config::install(platform.clone()).await;
        }

        if self.setup_groups || self.setup_server {
            let groups = Groups::install(&platform);

            if self.setup_server {
                let pool = crate::pool::install(&platform, groups);
                let _ = Server::install(&platform, pool);
            }
        }

        platform
    }
}
