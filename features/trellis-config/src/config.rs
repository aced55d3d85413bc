use std::{ops::Deref, sync::Arc};

use trellis_di::{Dependency, DiError, Injectable, Registry, RequireError, Resolution, Resolved};

use crate::provider::CONFIG_FEATURE;

/// A wrapper type for config injections
///
/// Configs installed from a [`ConfigProvider`](crate::ConfigProvider) are registered
/// with the `config` feature. [`Config::dependency`] asks for exactly those, so a
/// producer can declare a config dependency and unwrap it with [`Config::from_resolved`].
///
/// # Example
/// ```rust
/// use trellis_config::{Config, ConfigProvider};
/// use trellis_di::Registry;
///
/// struct MyModuleConfig {
///     enabled: bool,
/// }
///
/// let mut provider = ConfigProvider::new();
/// provider.add_config(MyModuleConfig { enabled: true })?;
///
/// let registry = Registry::new();
/// provider.install(&registry)?;
///
/// let config = Config::<MyModuleConfig>::resolve(&registry)?;
/// assert!(config.enabled);
/// # Ok::<(), trellis_config::ConfigError>(())
/// ```
pub struct Config<T> {
    inner: Arc<T>,
}

impl<T> Deref for Config<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Config {
            inner: self.inner.clone(),
        }
    }
}

impl<T> From<Arc<T>> for Config<T> {
    fn from(inner: Arc<T>) -> Self {
        Config { inner }
    }
}

impl<T> Config<T> {
    pub fn inner(&self) -> Arc<T> {
        self.inner.clone()
    }

    pub fn into_inner(self) -> Arc<T> {
        self.inner
    }
}

impl<T: Injectable> Config<T> {
    /// Dependency on the installed config of type `T`
    pub fn dependency() -> Dependency {
        Dependency::on::<T>().with_feature(CONFIG_FEATURE)
    }

    /// Requests the config from the registry
    pub fn resolve(registry: &Registry) -> Result<Self, DiError> {
        match registry.query(Self::dependency())? {
            Resolution::One(instance) => instance
                .downcast::<T>()
                .map(Config::from)
                .map_err(|actual_type| {
                    RequireError::DowncastFailed {
                        required_type: std::any::type_name::<T>(),
                        actual_type,
                    }
                    .into()
                }),
            _ => Err(RequireError::Missing(std::any::type_name::<T>().to_string()).into()),
        }
    }

    /// Takes the config declared under `name` from resolved dependencies
    pub fn from_resolved(resolved: &Resolved, name: &str) -> Result<Self, RequireError> {
        resolved.get::<T>(name).map(Config::from)
    }
}
