use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use trellis_di::RegistryConfig;

use crate::errors::ConfigError;

/// Prefix of environment variables read by default
pub const DEFAULT_ENV_PREFIX: &str = "TRELLIS_";

/// Loads configs from defaults, a TOML file and the environment
///
/// Sources are merged in this order, later ones override earlier ones:
/// 1. `T::default()`
/// 2. the TOML file, if one is set and exists
/// 3. environment variables starting with the prefix, e.g. `TRELLIS_MAX_RESOLUTION_DEPTH`
///
/// A double underscore in a variable name separates nested keys.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        ConfigLoader {
            path: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Layers the file and the environment over `defaults`
    fn layered(&self, defaults: Figment) -> Figment {
        let mut figment = defaults;
        if let Some(path) = &self.path {
            match path.exists() {
                true => {
                    tracing::debug!("Reading config file {}", path.display());
                    figment = figment.merge(Toml::file(path));
                }
                false => tracing::debug!("Config file {} not found, skipping", path.display()),
            }
        }
        // TRELLIS_HTTP__PORT sets `port` within the `http` table
        figment.merge(Env::prefixed(&self.env_prefix).split("__"))
    }

    /// Loads a whole config document
    pub fn load<T: Serialize + DeserializeOwned + Default>(&self) -> Result<T, ConfigError> {
        let figment = self.layered(Figment::from(Serialized::defaults(T::default())));
        Ok(figment.extract()?)
    }

    /// Loads the table under `key`, e.g. `[http]` in the TOML file
    pub fn load_section<T: Serialize + DeserializeOwned + Default>(&self, key: &str) -> Result<T, ConfigError> {
        let figment = self.layered(Figment::from(Serialized::defaults(T::default()).key(key)));
        Ok(figment.extract_inner(key)?)
    }

    /// Loads the tunables of a registry
    pub fn registry_config(&self) -> Result<RegistryConfig, ConfigError> {
        let config: RegistryConfig = self.load()?;
        tracing::debug!("Loaded registry config {config:?}");
        Ok(config)
    }
}
