use serde::{Deserialize, Serialize};

use crate::types::{Feature, DEFAULT_FEATURE};

/// Tunables of a [`Registry`](crate::Registry)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Whether producers are cached singletons unless registered otherwise
    pub default_singleton: bool,
    /// Features breaking ties for dependencies without explicit preferences
    pub default_preference: Vec<Feature>,
    /// Limit on nested constructor dependencies within one request
    pub max_resolution_depth: usize,
    /// Limit on objects going through setter injection within one request
    pub max_session_objects: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            default_singleton: true,
            default_preference: vec![DEFAULT_FEATURE],
            max_resolution_depth: 100,
            max_session_objects: 10_000,
        }
    }
}
