use std::{borrow::Cow, collections::BTreeMap, sync::Arc};

use crate::{
    dependency::{Dependencies, Dependency},
    errors::RequireError,
    producer::Producer,
    resolved::{Args, Resolution, Resolved},
    types::{merge_features, DynError, Feature, Injectable, Instance, TypeInfo},
};

type BuildFn<T> = Arc<dyn Fn(&Resolved, &Args) -> Result<Arc<T>, DynError> + Send + Sync>;
type InjectFn<T> = Arc<dyn Fn(&T, Resolution) -> Result<(), DynError> + Send + Sync>;
type HookFn<T> = Arc<dyn Fn(&T) -> Result<(), DynError> + Send + Sync>;

/// Producer assembled from closures
///
/// `T` may be unsized, so a producer can hand out `dyn Trait` objects directly:
///
/// ```rust
/// # use std::sync::Arc;
/// # use trellis_di::{FromFn, Dependency};
/// trait Clock: Send + Sync {
///     fn now(&self) -> u64;
/// }
/// struct Fixed(u64);
/// impl Clock for Fixed {
///     fn now(&self) -> u64 {
///         self.0
///     }
/// }
///
/// let clock = FromFn::<dyn Clock>::shared(|_, _| Ok(Arc::new(Fixed(42)) as Arc<dyn Clock>))
///     .feature("fixed");
/// ```
pub struct FromFn<T: Injectable + ?Sized> {
    build: BuildFn<T>,
    features: Vec<Feature>,
    constructor_dependencies: Dependencies,
    setter_dependencies: Dependencies,
    injectors: BTreeMap<String, InjectFn<T>>,
    post_initialize: Option<HookFn<T>>,
}

impl<T: Injectable> FromFn<T> {
    pub fn new(
        build: impl Fn(&Resolved, &Args) -> Result<T, DynError> + Send + Sync + 'static,
    ) -> Self {
        Self::shared(move |dependencies, args| build(dependencies, args).map(Arc::new))
    }
}

impl<T: Injectable + ?Sized> FromFn<T> {
    /// Like [`FromFn::new`] for closures returning shared, possibly unsized, values
    pub fn shared(
        build: impl Fn(&Resolved, &Args) -> Result<Arc<T>, DynError> + Send + Sync + 'static,
    ) -> Self {
        FromFn {
            build: Arc::new(build),
            features: Vec::new(),
            constructor_dependencies: Dependencies::new(),
            setter_dependencies: Dependencies::new(),
            injectors: BTreeMap::new(),
            post_initialize: None,
        }
    }

    pub fn feature(mut self, feature: impl Into<Feature>) -> Self {
        merge_features(&mut self.features, [feature]);
        self
    }

    pub fn features<F: Into<Feature>>(mut self, features: impl IntoIterator<Item = F>) -> Self {
        merge_features(&mut self.features, features);
        self
    }

    /// Declares a constructor dependency
    pub fn dependency(mut self, name: impl Into<String>, dependency: Dependency) -> Self {
        self.constructor_dependencies.insert(name.into(), dependency);
        self
    }

    /// Declares a setter dependency together with the closure storing it
    pub fn setter(
        mut self,
        name: impl Into<String>,
        dependency: Dependency,
        inject: impl Fn(&T, Resolution) -> Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        self.setter_dependencies.insert(name.clone(), dependency);
        self.injectors.insert(name, Arc::new(inject));
        self
    }

    pub fn post_initialize(
        mut self,
        hook: impl Fn(&T) -> Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        self.post_initialize = Some(Arc::new(hook));
        self
    }

    fn target(&self, instance: &Instance) -> Result<Arc<T>, RequireError> {
        instance.downcast::<T>().map_err(RequireError::downcast::<T>)
    }
}

impl<T: Injectable + ?Sized> Producer for FromFn<T> {
    fn provided_type(&self) -> TypeInfo {
        TypeInfo::of::<T>()
    }

    fn provided_features(&self) -> &[Feature] {
        &self.features
    }

    fn constructor_dependencies(&self) -> Cow<'_, Dependencies> {
        Cow::Borrowed(&self.constructor_dependencies)
    }

    fn setter_dependencies(&self, _instance: Option<&Instance>) -> Cow<'_, Dependencies> {
        Cow::Borrowed(&self.setter_dependencies)
    }

    fn build(&self, dependencies: &Resolved, args: Args) -> Result<Instance, DynError> {
        (self.build)(dependencies, &args).map(Instance::from_arc)
    }

    fn inject(&self, instance: &Instance, argument: &str, value: Resolution) -> Result<(), DynError> {
        let inject = self
            .injectors
            .get(argument)
            .ok_or_else(|| format!("No injector for '{argument}' on {}", self.describe()))?;
        let target = self.target(instance)?;
        inject(&*target, value)
    }

    fn post_initialize(&self, instance: &Instance) -> Result<(), DynError> {
        match &self.post_initialize {
            Some(hook) => {
                let target = self.target(instance)?;
                hook(&*target)
            }
            None => Ok(()),
        }
    }
}
