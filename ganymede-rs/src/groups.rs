//! Provides the registry which keeps all groups of a node by name.
//!
//! The registry is an explicit object rather than a global. Most probably it is created by the
//! [Builder](crate::builder::Builder) and then obtained via `platform.require::<Groups>()`. The
//! [HttpPool](crate::pool::HttpPool) uses it to find the group a peer asks for.
//!
//! # Example
//! ```
//! # use ganymede::groups::Groups;
//! let groups = Groups::new();
//! let scores = groups
//!     .new_group("scores", 2 << 10, |key: String| async move {
//!         Ok::<_, anyhow::Error>(key.into_bytes())
//!     })
//!     .unwrap();
//!
//! assert_eq!(groups.get_group("scores").unwrap().name(), scores.name());
//! assert!(groups.get_group("unknown").is_none());
//!
//! // Names are unique...
//! assert!(groups
//!     .new_group("scores", 0, |key: String| async move {
//!         Ok::<_, anyhow::Error>(key.into_bytes())
//!     })
//!     .is_err());
//! ```
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{CacheError, CacheResult};
use crate::group::{Group, Loader};
use crate::platform::Platform;

/// Keeps all groups of this node.
#[derive(Default)]
pub struct Groups {
    groups: Mutex<HashMap<String, Arc<Group>>>,
}

impl Groups {
    /// Creates a new and empty registry.
    pub fn new() -> Self {
        Groups::default()
    }

    /// Creates and installs an empty registry into the given platform.
    ///
    /// Note that this is called by the [Builder](crate::builder::Builder) unless disabled.
    pub fn install(platform: &Arc<Platform>) -> Arc<Self> {
        let groups = Arc::new(Groups::new());
        platform.register::<Groups>(groups.clone());

        groups
    }

    /// Creates a new group and registers it under its name.
    ///
    /// Returns [CacheError::Setup](CacheError::Setup) if the name is already taken.
    pub fn new_group(
        &self,
        name: &str,
        max_memory: usize,
        loader: impl Loader + 'static,
    ) -> CacheResult<Arc<Group>> {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        if groups.contains_key(name) {
            return Err(CacheError::Setup(format!(
                "A group named '{}' has already been registered.",
                name
            )));
        }

        let group = Arc::new(Group::new(name, max_memory, loader));
        let _ = groups.insert(name.to_owned(), group.clone());
        log::info!(
            "Created group '{}' ({}).",
            name,
            if max_memory > 0 {
                crate::fmt::format_size(max_memory)
            } else {
                "unbounded".to_owned()
            }
        );

        Ok(group)
    }

    /// Returns the group with the given name or **None** if no such group exists.
    pub fn get_group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Lists the names of all registered groups in alphabetical order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();

        names
    }
}
