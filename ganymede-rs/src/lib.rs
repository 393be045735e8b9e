//! Ganymede is an embeddable, distributed read-through cache.
//!
//! # Introduction
//! Callers ask a named cache namespace (a [Group](group::Group)) for a key. The group either
//! serves the value from its in-process LRU store, fetches it from the peer which owns the key
//! or, if both fail, invokes a user supplied [Loader](group::Loader) and caches the result.
//!
//! This shields a slow backing store from duplicate concurrent reads while cache state is
//! shared across a fleet of peer processes without any central coordinator:
//! * Each key is owned by exactly one peer, determined by a [consistent hash ring](ring). Only
//!   the owner caches a value, so the fleet acts as one large cache.
//! * Concurrent lookups of the same key are [coalesced](singleflight), so that only one of them
//!   actually talks to the peer or loader.
//! * A failing peer never makes a key unfetchable. The group falls back to its own loader.
//!
//! # Features
//! * **Size constrained LRU store** which evicts by actual memory usage rather than entry count.
//!   See [lru].
//! * **100% Async/Await** - everything builds upon [tokio](https://tokio.rs/). Peers talk HTTP
//!   via [hyper](https://hyper.rs/), exchanging a compact **bincode** envelope.
//! * **No consistency protocol**. Entries on different nodes may become stale independently.
//!   There is no invalidation, no persistence and the peer set is fixed once the node is up.
//!
//! # Modules
//! * [group] and [groups]: the cache fill orchestration and the registry of all groups.
//! * [pool]: the HTTP peer transport which picks peers and answers their requests.
//! * [server] and [api]: the HTTP servers for peers and external clients.
//! * [builder], [platform], [config] and [signals]: the setup of a node.
//!
//! # Examples
//! A complete node is provided by **ganymede-io**. A short example on how to setup the library
//! can be found here: [Builder](builder::Builder).
#![deny(
    warnings,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod api;
pub mod builder;
pub mod byteview;
pub mod config;
pub mod error;
pub mod fmt;
pub mod group;
pub mod groups;
pub mod lru;
pub mod peers;
pub mod platform;
pub mod pool;
pub mod protocol;
pub mod ring;
pub mod server;
pub mod signals;
pub mod singleflight;

/// Contains the version of the Ganymede library.
pub const GANYMEDE_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Contains the git commit hash of the Ganymede build being used.
pub const GANYMEDE_REVISION: &str = "NO-REVISION";

/// Initializes the logging system.
///
/// Logs go to stdout with an ISO-8601 timestamp. Most probably this is invoked by the
/// [Builder](builder::Builder).
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // Tests may initialize the logging several times...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            eprintln!("Failed to initialize logging system: {}", error);
        }
    });
}

/// Executes an async block via `tokio::spawn` and drops the returned join handle.
///
/// # Example
/// ```rust
/// # #[macro_use] extern crate ganymede;
/// # #[tokio::main]
/// # async fn main() {
/// spawn!(async move {
///     // perform some async stuff here...
/// });
/// # }
/// ```
#[macro_export]
macro_rules! spawn {
    ($e:expr) => {{
        std::mem::drop(tokio::spawn($e));
    }};
}
