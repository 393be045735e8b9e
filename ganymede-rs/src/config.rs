//! Contains the system configuration.
//!
//! The configuration is read from **config/settings.yml** once during startup. As the set of
//! peers is fixed for the lifetime of a node, there is no change detection or live reload.
//!
//! Callers obtain a [Handle] via [Config::current] which provides cheap read access to the loaded
//! document. Values are addressed by dotted paths like **server.port**. Missing values yield
//! **Yaml::BadValue**, so that a fallback can be applied via e.g. `as_i64().unwrap_or(8001)`.
//!
//! # Example
//! ```
//! # use ganymede::config::Config;
//! let config = Config::new("somefile.yml");
//! config.load_from_string("
//! server:
//!     port: 8002
//! peers:
//!     addresses:
//!         - http://localhost:8001
//!         - http://localhost:8002
//! ").unwrap();
//!
//! let handle = config.current();
//! assert_eq!(handle.query("server.port").as_i64().unwrap(), 8002);
//! assert_eq!(handle.query("peers.addresses").as_vec().unwrap().len(), 2);
//! assert_eq!(handle.query("server.host").as_str().unwrap_or("0.0.0.0"), "0.0.0.0");
//! ```
use std::sync::Arc;

use anyhow::Context;
use arc_swap::ArcSwap;
use yaml_rust::{Yaml, YamlLoader};

use crate::platform::Platform;

/// Provides access to the system configuration.
pub struct Config {
    filename: String,
    config: ArcSwap<Yaml>,
}

/// Represents a handle to the currently loaded configuration.
///
/// This should only be kept around briefly, as it won't see a config which is loaded later.
pub struct Handle {
    config: Arc<Yaml>,
}

impl Config {
    /// Creates a new and empty config which is read from the given file once
    /// [load](Config::load) is invoked.
    pub fn new(file: &str) -> Self {
        Config {
            filename: file.to_owned(),
            config: ArcSwap::new(Arc::new(Yaml::Hash(Default::default()))),
        }
    }

    /// Obtains a handle to the currently loaded configuration.
    pub fn current(&self) -> Handle {
        Handle {
            config: self.config.load_full(),
        }
    }

    /// Reads the underlying file.
    ///
    /// A missing file is not an error, it simply leaves the config empty so that all defaults
    /// apply.
    pub async fn load(&self) -> anyhow::Result<()> {
        log::info!("Loading config file {}...", &self.filename);

        match tokio::fs::metadata(&self.filename).await {
            Ok(metadata) if metadata.is_file() => (),
            _ => {
                log::info!("Config file doesn't exist - using defaults.");
                return Ok(());
            }
        }

        let data = tokio::fs::read_to_string(&self.filename)
            .await
            .with_context(|| format!("Cannot load config file {}", &self.filename))?;

        self.load_from_string(data.as_str())
    }

    /// Loads the configuration from the given string instead of a file.
    ///
    /// If the data cannot be parsed, an error is returned and the previous config remains
    /// active.
    pub fn load_from_string(&self, data: &str) -> anyhow::Result<()> {
        let mut docs = YamlLoader::load_from_str(data)
            .with_context(|| format!("Cannot parse config file {}", &self.filename))?;

        let doc = if docs.is_empty() {
            Yaml::Hash(Default::default())
        } else {
            docs.swap_remove(0)
        };

        self.config.store(Arc::new(doc));

        Ok(())
    }
}

impl Handle {
    /// Provides access to the whole document.
    pub fn config(&self) -> &Yaml {
        &self.config
    }

    /// Resolves the given dotted path like **peers.replicas**.
    ///
    /// Returns **Yaml::BadValue** if any segment along the path is absent.
    pub fn query(&self, path: impl AsRef<str>) -> &Yaml {
        path.as_ref()
            .split('.')
            .fold(self.config.as_ref(), |node, key| &node[key])
    }
}

/// Creates and installs a **Config** for the given platform.
///
/// This reads **config/settings.yml** relative to the working directory. Note that this is
/// called by the [Builder](crate::builder::Builder) unless disabled.
pub async fn install(platform: Arc<Platform>) -> Arc<Config> {
    let config = Arc::new(Config::new("config/settings.yml"));
    platform.register::<Config>(config.clone());

    if let Err(error) = config.load().await {
        log::error!("{:#}", error);
    }

    config
}

#[cfg(test)]
mod tests {
    use crate::config::Config;

    #[test]
    fn dotted_paths_are_resolved() {
        let config = Config::new("test.yml");
        config
            .load_from_string(
                "
groups:
    scores:
        max_memory: 2k
peers:
    replicas: 50
",
            )
            .unwrap();

        let handle = config.current();
        assert_eq!(
            handle.query("groups.scores.max_memory").as_str().unwrap(),
            "2k"
        );
        assert_eq!(handle.query("peers.replicas").as_i64().unwrap(), 50);
        assert!(handle.query("peers.replicas.unknown").is_badvalue());
        assert!(handle.query("unknown").is_badvalue());
        assert!(handle.config()["groups"].as_hash().is_some());
    }

    #[test]
    fn invalid_data_keeps_the_previous_config() {
        let config = Config::new("test.yml");
        config.load_from_string("server:\n    port: 8001").unwrap();

        assert!(config.load_from_string("server: 'invalid").is_err());
        assert_eq!(config.current().query("server.port").as_i64().unwrap(), 8001);
    }

    #[test]
    fn missing_files_leave_the_defaults() {
        crate::testing::test_async(async {
            let config = Config::new("this/file/does/not/exist.yml");
            assert!(config.load().await.is_ok());
            assert!(config.current().query("server.port").is_badvalue());
        });
    }
}
