use std::{
    fmt::Debug,
    sync::{Arc, Weak},
};

use crate::{
    errors::{DiError, RequireError},
    producer::ProducerRef,
    registry::RegistryInner,
    resolved::{Args, Resolved},
    session,
    types::{Injectable, Instance},
};

/// A producer bound to its already resolved constructor dependencies
///
/// Handed out for handle dependencies. Every [`CurriedHandle::build`] creates a fresh object,
/// its setter dependencies and post initialization run before the call returns, or with the
/// surrounding construction when called while one is in progress.
#[derive(Clone)]
pub struct CurriedHandle(Arc<CurriedHandleInner>);
struct CurriedHandleInner {
    producer: ProducerRef,
    dependencies: Resolved,
    registry: Weak<RegistryInner>,
}

impl CurriedHandle {
    pub(crate) fn new(producer: ProducerRef, dependencies: Resolved, registry: Weak<RegistryInner>) -> Self {
        Self(Arc::new(CurriedHandleInner {
            producer,
            dependencies,
            registry,
        }))
    }

    pub fn producer(&self) -> &ProducerRef {
        &self.0.producer
    }

    /// The constructor dependencies resolved when the handle was made
    pub fn dependencies(&self) -> &Resolved {
        &self.0.dependencies
    }

    pub fn build(&self, args: Args) -> Result<Instance, DiError> {
        let registry = self.0.registry.upgrade().ok_or(DiError::RegistryDropped)?;
        session::build_curried(&registry, &self.0.producer, &self.0.dependencies, args)
    }

    pub fn build_as<T: Injectable + ?Sized>(&self, args: Args) -> Result<Arc<T>, DiError> {
        let instance = self.build(args)?;
        Ok(instance
            .downcast::<T>()
            .map_err(RequireError::downcast::<T>)?)
    }

    /// The handle as a plain function
    pub fn as_fn(&self) -> impl Fn(Args) -> Result<Instance, DiError> + Send + Sync + 'static {
        let handle = self.clone();
        move |args| handle.build(args)
    }
}

impl Debug for CurriedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurriedHandle")
            .field("producer", &self.0.producer.describe())
            .field("dependencies", &self.0.dependencies.len())
            .finish()
    }
}
