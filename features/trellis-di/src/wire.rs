use std::{any::type_name, borrow::Cow, marker::PhantomData, sync::OnceLock};

use crate::{
    dependency::{Dependencies, Dependency},
    errors::RequireError,
    hierarchy::TypeHierarchy,
    producer::Producer,
    resolved::{Args, Resolution, Resolved},
    types::{merge_features, DynError, Feature, Injectable, Instance, TypeInfo},
};

/// What a [`Wire`] type declares about itself
#[derive(Debug, Clone, Default)]
pub struct Declaration {
    features: Vec<Feature>,
    constructor_dependencies: Dependencies,
    setter_dependencies: Dependencies,
}

impl Declaration {
    pub fn provides_feature(&mut self, feature: impl Into<Feature>) -> &mut Self {
        merge_features(&mut self.features, [feature]);
        self
    }

    /// Declares a constructor dependency, replacing an earlier one with the same name
    pub fn dependency(&mut self, name: impl Into<String>, dependency: Dependency) -> &mut Self {
        self.constructor_dependencies.insert(name.into(), dependency);
        self
    }

    pub fn setter_dependency(&mut self, name: impl Into<String>, dependency: Dependency) -> &mut Self {
        self.setter_dependencies.insert(name.into(), dependency);
        self
    }

    /// Declares a constructor dependency delivered as a producer handle
    pub fn handle_dependency(&mut self, name: impl Into<String>, dependency: Dependency) -> &mut Self {
        self.dependency(name, dependency.handle())
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn constructor_dependencies(&self) -> &Dependencies {
        &self.constructor_dependencies
    }

    pub fn setter_dependencies(&self) -> &Dependencies {
        &self.setter_dependencies
    }
}

/// A type that declares its own dependencies and knows how to construct itself
///
/// Declarations compose like inheritance: calling another type's `declare` first and then
/// adding to it inherits its features and dependencies.
///
/// Setter dependencies are handed to [`Wire::inject`] after construction, so the type
/// needs interior mutability (e.g. a `OnceLock`) for the fields receiving them.
pub trait Wire: Injectable + Sized {
    fn declare(declaration: &mut Declaration) {
        let _ = declaration;
    }

    fn construct(dependencies: &Resolved, args: &Args) -> Result<Self, DynError>;

    /// Additional setter dependencies of this particular object
    fn setter_dependencies_for(&self) -> Dependencies {
        Dependencies::new()
    }

    fn inject(&self, argument: &str, value: Resolution) -> Result<(), DynError> {
        let _ = value;
        Err(format!("{} accepts no setter dependency '{argument}'", type_name::<Self>()).into())
    }

    fn post_initialize(&self) -> Result<(), DynError> {
        Ok(())
    }
}

/// Producer for a [`Wire`] type, the declaration is evaluated once and kept
pub struct Wired<T: Wire> {
    declaration: OnceLock<Declaration>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Wire> Wired<T> {
    pub fn new() -> Self {
        Wired {
            declaration: OnceLock::new(),
            _marker: PhantomData,
        }
    }

    pub fn declaration(&self) -> &Declaration {
        self.declaration.get_or_init(|| {
            let mut declaration = Declaration::default();
            T::declare(&mut declaration);
            declaration
        })
    }

    /// Constructs outside of a registry, checking hand made dependencies against the declaration first
    ///
    /// Subtypes are judged by `hierarchy`, usually [`Registry::hierarchy`](crate::Registry::hierarchy).
    pub fn build_checked(&self, hierarchy: &TypeHierarchy, dependencies: &Resolved, args: &Args) -> Result<T, DynError> {
        for (name, dependency) in self.declaration().constructor_dependencies() {
            let value = dependencies.resolution(name).unwrap_or(&Resolution::Absent);
            dependency.check(name, value, hierarchy)?;
        }
        T::construct(dependencies, args)
    }

    fn target(instance: &Instance) -> Result<std::sync::Arc<T>, RequireError> {
        instance.downcast::<T>().map_err(RequireError::downcast::<T>)
    }
}

impl<T: Wire> Default for Wired<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Wire> Producer for Wired<T> {
    fn provided_type(&self) -> TypeInfo {
        TypeInfo::of::<T>()
    }

    fn provided_features(&self) -> &[Feature] {
        self.declaration().features()
    }

    fn constructor_dependencies(&self) -> Cow<'_, Dependencies> {
        Cow::Borrowed(self.declaration().constructor_dependencies())
    }

    fn setter_dependencies(&self, instance: Option<&Instance>) -> Cow<'_, Dependencies> {
        let declared = self.declaration().setter_dependencies();
        let Some(Ok(object)) = instance.map(Self::target) else {
            return Cow::Borrowed(declared);
        };
        let extra = object.setter_dependencies_for();
        if extra.is_empty() {
            return Cow::Borrowed(declared);
        }
        let mut merged = declared.clone();
        merged.extend(extra);
        Cow::Owned(merged)
    }

    fn build(&self, dependencies: &Resolved, args: Args) -> Result<Instance, DynError> {
        T::construct(dependencies, &args).map(Instance::new)
    }

    fn inject(&self, instance: &Instance, argument: &str, value: Resolution) -> Result<(), DynError> {
        Self::target(instance)?.inject(argument, value)
    }

    fn post_initialize(&self, instance: &Instance) -> Result<(), DynError> {
        Self::target(instance)?.post_initialize()
    }
}
