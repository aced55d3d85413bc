use std::sync::Arc;

use crate::{
    dependency::Refinement,
    errors::DiError,
    from_fn::FromFn,
    from_instance::FromInstance,
    producer::{Producer, ProducerRef},
    registry::{ProducerId, RegisterOptions, Registry},
    resolved::{Args, Resolved},
    types::{DynError, Feature, Injectable, Instance, DEFAULT_FEATURE},
    wire::{Wire, Wired},
    wrapped::WrapOptions,
};

enum Source {
    Producer(ProducerRef),
    Instance(FromInstance),
}

/// Everything needed to add one producer to a [`Registry`]
///
/// Options that change the producer (features, refinements, fixed arguments, a custom
/// construction routine) decorate it with a [`Wrapped`](crate::Wrapped) producer.
///
/// ```rust
/// # use trellis_di::{Registration, Registry};
/// let registry = Registry::new();
/// registry
///     .add(Registration::instance(8080u16).name("port"))
///     .unwrap();
/// assert_eq!(*registry.named::<u16>("port").unwrap(), 8080);
/// ```
pub struct Registration {
    source: Source,
    name: Option<String>,
    singleton: Option<bool>,
    options: WrapOptions,
}

impl Registration {
    fn from_source(source: Source) -> Self {
        Registration {
            source,
            name: None,
            singleton: None,
            options: WrapOptions::new(),
        }
    }

    pub fn producer(producer: impl Producer + 'static) -> Self {
        Self::shared(Arc::new(producer))
    }

    pub fn shared(producer: ProducerRef) -> Self {
        Self::from_source(Source::Producer(producer))
    }

    /// Registers an existing object
    pub fn instance<T: Injectable>(value: T) -> Self {
        Self::from_source(Source::Instance(FromInstance::new(value)))
    }

    pub fn instance_of(instance: Instance) -> Self {
        Self::from_source(Source::Instance(FromInstance::from_instance(instance)))
    }

    /// Registers a closure building `T`
    pub fn build_fn<T: Injectable>(
        build: impl Fn(&Resolved, &Args) -> Result<T, DynError> + Send + Sync + 'static,
    ) -> Self {
        Self::producer(FromFn::new(build))
    }

    /// Registers a [`Wire`] type
    pub fn wired<T: Wire>() -> Self {
        Self::producer(Wired::<T>::new())
    }

    /// Binds a name the producer can be requested by, the name is also added as a feature
    pub fn name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.options = self.options.feature(name.clone());
        self.name = Some(name);
        self
    }

    pub fn feature(mut self, feature: impl Into<Feature>) -> Self {
        self.options = self.options.feature(feature);
        self
    }

    pub fn features<F: Into<Feature>>(mut self, features: impl IntoIterator<Item = F>) -> Self {
        self.options = self.options.features(features);
        self
    }

    /// Marks the producer as the one preferred when several match
    pub fn default(self) -> Self {
        self.feature(DEFAULT_FEATURE)
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = Some(singleton);
        self
    }

    /// Builds a fresh object for every request
    pub fn transient(self) -> Self {
        self.singleton(false)
    }

    /// Arguments placed in front of the ones given at build time
    pub fn args(mut self, args: Args) -> Self {
        self.options = self.options.args(args);
        self
    }

    /// Narrows the dependency declared under `argument`
    pub fn refine(mut self, argument: impl Into<String>, refinement: Refinement) -> Self {
        self.options = self.options.refine(argument, refinement);
        self
    }

    /// Replaces the producer's build routine, dependencies stay as declared
    pub fn construct_with(
        mut self,
        construct: impl Fn(&Resolved, Args) -> Result<Instance, DynError> + Send + Sync + 'static,
    ) -> Self {
        self.options = self.options.construct_with(construct);
        self
    }
}

impl Registry {
    /// Registers the producer described by `registration`
    pub fn add(&self, registration: Registration) -> Result<ProducerId, DiError> {
        let Registration {
            source,
            name,
            singleton,
            mut options,
        } = registration;

        let producer: ProducerRef = match source {
            Source::Producer(producer) => producer,
            Source::Instance(instance) => Arc::new(instance.with_features(options.take_features())),
        };
        let producer: ProducerRef = match options.is_empty() {
            true => producer,
            false => Arc::new(self.wrap(producer, options)?),
        };

        self.register(producer, RegisterOptions { name, singleton })
    }
}
