//! Trellis Config loads configs and makes them injectable through a [`trellis_di::Registry`].
//!
//! Trellis Config is split into three parts:
//! 1. [`ConfigLoader`]: reads configs from defaults, a TOML file and the environment
//! 2. [`ConfigProvider`]: collects configs by type and installs them into a registry
//! 3. [`Config<T>`]: a wrapper to resolve and retrieve an installed config
//!
//! # Examples
//!
//! ```rust
//! use trellis_config::{ConfigLoader, ConfigProvider};
//! use trellis_di::{FromFn, Registration, Registry};
//!
//! #[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
//! struct HttpConfig {
//!     host: String,
//!     port: u16,
//! }
//!
//! struct Server {
//!     address: String,
//! }
//!
//! let loader = ConfigLoader::new().with_path("trellis.toml");
//! let registry = Registry::with_config(loader.registry_config()?);
//!
//! let mut provider = ConfigProvider::new();
//! provider.add_config(HttpConfig {
//!     host: "localhost".to_string(),
//!     port: 8080,
//! })?;
//! provider.install(&registry)?;
//!
//! registry.add(Registration::producer(
//!     FromFn::new(|dependencies, _| {
//!         let http = trellis_config::Config::<HttpConfig>::from_resolved(dependencies, "http")?;
//!         Ok(Server {
//!             address: format!("{}:{}", http.host, http.port),
//!         })
//!     })
//!     .dependency("http", trellis_config::Config::<HttpConfig>::dependency()),
//! ))?;
//!
//! assert_eq!(registry.get::<Server>()?.address, "localhost:8080");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod errors;
pub mod loader;
pub mod provider;

pub use config::Config;
pub use errors::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use provider::{ConfigProvider, CONFIG_FEATURE};
