use std::{collections::BTreeMap, sync::Arc};

use trellis_di::{Feature, Injectable, Instance, Registration, Registry, TypeInfo};

use crate::errors::ConfigError;

/// Feature every installed config provides, so configs are never mistaken for services
pub const CONFIG_FEATURE: Feature = Feature::new("config");

/// A provider to register all configs.
///
/// Configs are registered and retrieved by type, at most one per type.
/// [`ConfigProvider::install`] hands them to a [`Registry`] where they can be injected.
#[derive(Debug, Default, Clone)]
pub struct ConfigProvider {
    configs: BTreeMap<TypeInfo, Instance>,
}

impl ConfigProvider {
    /// Initializes an empty Config Provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve the config of type `T`, if one was added
    pub fn get_config<T: Injectable>(&self) -> Option<Arc<T>> {
        self.configs
            .get(&TypeInfo::of::<T>())
            .and_then(|config| config.downcast::<T>().ok())
    }

    /// Like [`ConfigProvider::get_config`], failing with [`ConfigError::Missing`]
    pub fn require_config<T: Injectable>(&self) -> Result<Arc<T>, ConfigError> {
        self.get_config()
            .ok_or_else(|| ConfigError::Missing(TypeInfo::of::<T>()))
    }

    /// Add a config to the provider.
    ///
    /// Fails with [`ConfigError::AlreadyRegistered`] if a config of the same type exists
    pub fn add_config<T: Injectable>(&mut self, config: T) -> Result<&mut Self, ConfigError> {
        let info = TypeInfo::of::<T>();
        if self.configs.contains_key(&info) {
            return Err(ConfigError::AlreadyRegistered(info));
        }

        self.configs.insert(info, Instance::new(config));
        Ok(self)
    }

    /// Can optionally add a config to the provider.
    ///
    /// `Some(config)` is the same as calling [`ConfigProvider::add_config`],
    /// `None` just returns `Ok(self)` for chaining
    pub fn maybe_add_config<T: Injectable>(&mut self, config: Option<T>) -> Result<&mut Self, ConfigError> {
        match config {
            Some(config) => self.add_config(config),
            None => Ok(self),
        }
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Registers every config as a singleton instance providing the `config` feature
    ///
    /// Registrations are not rolled back: if one fails, the configs installed before it stay
    /// registered. The instances carry no names, so the only failure is calling this from
    /// inside a construction session of `registry`, which is refused before anything is added.
    pub fn install(&self, registry: &Registry) -> Result<(), ConfigError> {
        for (info, config) in &self.configs {
            registry.add(
                Registration::instance_of(config.clone())
                    .feature(CONFIG_FEATURE)
                    .singleton(true),
            )?;
            tracing::debug!("Installed config {info}");
        }
        Ok(())
    }
}
