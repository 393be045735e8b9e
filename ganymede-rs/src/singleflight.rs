//! Coalesces concurrent computations for the same key into a single execution.
//!
//! The first caller asking for a key (the **leader**) registers a call and runs the given
//! computation. Every caller arriving for the same key while this call is in flight (a
//! **follower**) doesn't run its own computation but waits for the leader and receives a clone
//! of its result. Once the result is published, the key is deregistered so that the next caller
//! starts a fresh computation.
//!
//! The registry of in-flight calls is guarded by a single mutex which is only held while the
//! map is being modified, never while a computation runs. Therefore unrelated keys never block
//! each other.
//!
//! There is no timeout. If a computation never completes, neither do its followers. However, if
//! the leader is dropped before it completed (e.g. as the surrounding task was cancelled), its
//! registration is removed and the waiting followers compete again for the leadership.
//!
//! # Example
//! ```
//! # use ganymede::singleflight::SingleFlight;
//! # #[tokio::main]
//! # async fn main() {
//! let flight: SingleFlight<String> = SingleFlight::new();
//!
//! let (a, b) = tokio::join!(
//!     flight.work("Tom", || async {
//!         tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//!         "630".to_owned()
//!     }),
//!     flight.work("Tom", || async { "unused".to_owned() }),
//! );
//!
//! // The second call joined the first one and received its result...
//! assert_eq!(a, "630");
//! assert_eq!(b, "630");
//! # }
//! ```
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

/// Keeps track of all computations currently in flight.
pub struct SingleFlight<T> {
    calls: Mutex<HashMap<String, watch::Receiver<Option<T>>>>,
}

enum Registration<T> {
    Leader(watch::Sender<Option<T>>),
    Follower(watch::Receiver<Option<T>>),
}

/// Owns the registration of a running computation.
///
/// If this is dropped without a result being published, the registration is removed which
/// closes the channel and wakes all followers.
struct Leader<'a, T> {
    flight: &'a SingleFlight<T>,
    key: &'a str,
    sender: Option<watch::Sender<Option<T>>>,
}

impl<T: Clone> Leader<'_, T> {
    fn complete(mut self, result: T) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send_replace(Some(result));
            self.flight.deregister(self.key);
        }
    }
}

impl<T> Drop for Leader<'_, T> {
    fn drop(&mut self) {
        if self.sender.take().is_some() {
            self.flight.deregister(self.key);
        }
    }
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        SingleFlight {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    /// Creates a new and empty registry.
    pub fn new() -> Self {
        SingleFlight::default()
    }

    /// Executes the given computation for the given key unless one is already in flight.
    ///
    /// In the latter case, this waits for the running computation and returns a clone of its
    /// result instead. All callers which overlap with a computation therefore observe the
    /// exact same result.
    pub async fn work<F, Fut>(&self, key: &str, computation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let sender = loop {
            let mut receiver = match self.register(key) {
                Registration::Leader(sender) => break sender,
                Registration::Follower(receiver) => receiver,
            };

            let result = match receiver.wait_for(Option::is_some).await {
                Ok(result) => result.as_ref().cloned(),
                Err(_) => None,
            };
            if let Some(result) = result {
                return result;
            }

            // The leader was dropped without producing a result - try again...
        };

        let leader = Leader {
            flight: self,
            key,
            sender: Some(sender),
        };
        let result = computation().await;
        leader.complete(result.clone());

        result
    }

    /// Returns the number of keys which currently have a computation in flight.
    pub fn in_flight(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<T> SingleFlight<T> {
    fn register(&self, key: &str) -> Registration<T> {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(receiver) = calls.get(key) {
            Registration::Follower(receiver.clone())
        } else {
            let (sender, receiver) = watch::channel(None);
            let _ = calls.insert(key.to_owned(), receiver);
            Registration::Leader(sender)
        }
    }

    fn deregister(&self, key: &str) {
        let _ = self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
