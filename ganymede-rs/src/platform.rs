//! Provides a tiny container which keeps the central components of a node.
//!
//! Components like the [Config](crate::config::Config), the [Groups](crate::groups::Groups)
//! registry or the [HttpPool](crate::pool::HttpPool) are registered as **Arc<T>** and looked up
//! by their type. The platform also carries the central **is_running** flag which is checked by
//! all long running loops and toggled by [Platform::terminate].
//!
//! Once terminated, all components are released. Code which might run during shutdown should
//! therefore use [Platform::find] and handle **None** instead of [Platform::require].
//!
//! # Example
//! ```
//! # use ganymede::platform::Platform;
//! # use ganymede::groups::Groups;
//! let platform = Platform::new();
//! let _ = Groups::install(&platform);
//!
//! assert!(platform.find::<Groups>().is_some());
//! assert!(platform.is_running());
//!
//! platform.terminate();
//! assert!(platform.find::<Groups>().is_none());
//! assert!(!platform.is_running());
//! ```
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Keeps all central components in a single place.
pub struct Platform {
    services: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    is_running: AtomicBool,
}

impl Platform {
    /// Creates a new and running platform without any components.
    pub fn new() -> Arc<Self> {
        Arc::new(Platform {
            services: Mutex::new(HashMap::new()),
            is_running: AtomicBool::new(true),
        })
    }

    /// Registers a component. An already registered component of the same type is replaced.
    pub fn register<T>(&self, service: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let _ = self
            .services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<T>(), service);
    }

    /// Tries to resolve a previously registered component.
    pub fn find<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.clone().downcast::<T>().ok())
    }

    /// Resolves a component which is known to be present.
    ///
    /// # Panics
    /// Panics if the component isn't registered or if the platform is already shutting down.
    /// Both cases indicate a wiring bug during startup.
    ///
    /// ```should_panic
    /// # use ganymede::platform::Platform;
    /// # use ganymede::groups::Groups;
    /// let platform = Platform::new();
    /// platform.require::<Groups>();
    /// ```
    pub fn require<T>(&self) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        if !self.is_running() {
            panic!(
                "The component {} was requested while the platform is shutting down!",
                std::any::type_name::<T>()
            );
        }

        match self.find::<T>() {
            Some(service) => service,
            None => panic!(
                "The required component {} is not registered!",
                std::any::type_name::<T>()
            ),
        }
    }

    /// Determines if the platform is still running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Terminates the platform.
    ///
    /// This releases all components and flips [is_running](Platform::is_running) to **false**
    /// so that all server loops exit.
    pub fn terminate(&self) {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        self.is_running.store(false, Ordering::Release);
    }
}
