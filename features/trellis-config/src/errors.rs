use trellis_di::{DiError, TypeInfo};

/// Errors around loading, registering and retrieving configs
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A config of this type is already registered
    #[error("A config of type {0} is already registered")]
    AlreadyRegistered(TypeInfo),
    /// The required config is not known
    #[error("No config of type {0} is known")]
    Missing(TypeInfo),
    /// The config sources could not be read or did not deserialize
    #[error("Failed to load config: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error(transparent)]
    Registry(#[from] DiError),
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::Load(Box::new(error))
    }
}
