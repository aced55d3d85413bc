use std::{borrow::Cow, sync::Arc};

use crate::{
    dependency::Dependencies,
    resolved::{Args, Resolution, Resolved},
    types::{DynError, Feature, Instance, TypeInfo},
};

/// Shared handle to a producer, the registry and decorators hold producers this way
pub type ProducerRef = Arc<dyn Producer>;

/// Something that knows how to build objects of some type
///
/// A producer declares what it provides, which dependencies must be resolved before it can
/// build (constructor dependencies), and which are injected into the built object afterwards
/// (setter dependencies). Setter dependencies may point back at the object that needs them,
/// which is how cycles are broken.
pub trait Producer: Send + Sync {
    /// Type of the objects built, the root type when unknown
    fn provided_type(&self) -> TypeInfo {
        TypeInfo::root()
    }

    fn provided_features(&self) -> &[Feature] {
        &[]
    }

    /// Dependencies resolved before [`Producer::build`] is called
    fn constructor_dependencies(&self) -> Cow<'_, Dependencies> {
        Cow::Owned(Dependencies::new())
    }

    /// Dependencies injected after the object was built.
    ///
    /// Called with `None` when inspecting the producer, and with the built object during
    /// construction so the answer may depend on it.
    fn setter_dependencies(&self, instance: Option<&Instance>) -> Cow<'_, Dependencies> {
        let _ = instance;
        Cow::Owned(Dependencies::new())
    }

    fn build(&self, dependencies: &Resolved, args: Args) -> Result<Instance, DynError>;

    /// Hands a resolved setter dependency to the built object
    fn inject(&self, instance: &Instance, argument: &str, value: Resolution) -> Result<(), DynError> {
        let _ = value;
        Err(format!(
            "'{}' cannot inject '{argument}' into {}",
            self.describe(),
            instance.info()
        )
        .into())
    }

    /// Runs once every setter dependency of the session was injected
    fn post_initialize(&self, instance: &Instance) -> Result<(), DynError> {
        let _ = instance;
        Ok(())
    }

    /// Human readable name used in errors and logs
    fn describe(&self) -> String {
        self.provided_type().to_string()
    }
}

impl std::fmt::Debug for dyn Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("provides", &self.provided_type().type_name)
            .field("features", &self.provided_features())
            .finish()
    }
}
