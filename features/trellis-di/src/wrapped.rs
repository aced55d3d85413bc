use std::{borrow::Cow, sync::Arc};

use crate::{
    dependency::{Dependencies, Refinement},
    errors::DiError,
    hierarchy::TypeHierarchy,
    producer::{Producer, ProducerRef},
    resolved::{Args, Resolution, Resolved},
    types::{merge_features, DynError, Feature, Instance, TypeInfo},
};

/// Replacement build routine for a decorated producer
pub type ConstructFn = Arc<dyn Fn(&Resolved, Args) -> Result<Instance, DynError> + Send + Sync>;

/// Adjustments applied by a [`Wrapped`] producer
#[derive(Clone, Default)]
pub struct WrapOptions {
    features: Vec<Feature>,
    refinements: Vec<(String, Refinement)>,
    args: Option<Args>,
    construct: Option<ConstructFn>,
}

impl WrapOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feature(mut self, feature: impl Into<Feature>) -> Self {
        merge_features(&mut self.features, [feature]);
        self
    }

    pub fn features<F: Into<Feature>>(mut self, features: impl IntoIterator<Item = F>) -> Self {
        merge_features(&mut self.features, features);
        self
    }

    /// Narrows the dependency declared under `argument`
    pub fn refine(mut self, argument: impl Into<String>, refinement: Refinement) -> Self {
        self.refinements.push((argument.into(), refinement));
        self
    }

    /// Arguments placed in front of the ones given at build time
    pub fn args(mut self, args: Args) -> Self {
        self.args = Some(args);
        self
    }

    /// Builds with this routine instead of the wrapped producer's own
    pub fn construct_with(
        mut self,
        construct: impl Fn(&Resolved, Args) -> Result<Instance, DynError> + Send + Sync + 'static,
    ) -> Self {
        self.construct = Some(Arc::new(construct));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
            && self.refinements.is_empty()
            && self.args.is_none()
            && self.construct.is_none()
    }

    pub(crate) fn take_features(&mut self) -> Vec<Feature> {
        std::mem::take(&mut self.features)
    }
}

/// Decorates a producer with extra features, refined dependencies, fixed arguments or a
/// different build routine, delegating everything else
pub struct Wrapped {
    wrapped: ProducerRef,
    features: Vec<Feature>,
    constructor_dependencies: Dependencies,
    /// Refined setter dependencies, laid over the wrapped producer's own
    setter_overrides: Dependencies,
    initial_args: Option<Args>,
    construct: Option<ConstructFn>,
}

impl Wrapped {
    /// Fails when a refinement names an argument the wrapped producer does not declare,
    /// or narrows a dependency to an incompatible type
    pub fn new(wrapped: ProducerRef, options: WrapOptions, hierarchy: &TypeHierarchy) -> Result<Self, DiError> {
        let mut features = wrapped.provided_features().to_vec();
        merge_features(&mut features, options.features);

        let mut constructor_dependencies = wrapped.constructor_dependencies().into_owned();
        let setter_dependencies = wrapped.setter_dependencies(None);
        let mut setter_overrides = Dependencies::new();

        for (argument, refinement) in &options.refinements {
            if let Some(dependency) = constructor_dependencies.get_mut(argument) {
                *dependency = dependency.with_options(refinement, hierarchy)?;
                continue;
            }
            let existing = setter_overrides
                .get(argument)
                .or_else(|| setter_dependencies.get(argument))
                .ok_or_else(|| DiError::NoSuchDependency {
                    producer: wrapped.describe(),
                    argument: argument.clone(),
                })?;
            let refined = existing.with_options(refinement, hierarchy)?;
            setter_overrides.insert(argument.clone(), refined);
        }
        drop(setter_dependencies);

        Ok(Wrapped {
            wrapped,
            features,
            constructor_dependencies,
            setter_overrides,
            initial_args: options.args,
            construct: options.construct,
        })
    }

    pub fn wrapped(&self) -> &ProducerRef {
        &self.wrapped
    }
}

impl Producer for Wrapped {
    fn provided_type(&self) -> TypeInfo {
        self.wrapped.provided_type()
    }

    fn provided_features(&self) -> &[Feature] {
        &self.features
    }

    fn constructor_dependencies(&self) -> Cow<'_, Dependencies> {
        Cow::Borrowed(&self.constructor_dependencies)
    }

    fn setter_dependencies(&self, instance: Option<&Instance>) -> Cow<'_, Dependencies> {
        let dependencies = self.wrapped.setter_dependencies(instance);
        if self.setter_overrides.is_empty() {
            return dependencies;
        }
        let mut dependencies = dependencies.into_owned();
        dependencies.extend(
            self.setter_overrides
                .iter()
                .map(|(name, dependency)| (name.clone(), dependency.clone())),
        );
        Cow::Owned(dependencies)
    }

    fn build(&self, dependencies: &Resolved, mut args: Args) -> Result<Instance, DynError> {
        if let Some(initial_args) = &self.initial_args {
            args.prepend(initial_args);
        }
        match &self.construct {
            Some(construct) => construct(dependencies, args),
            None => self.wrapped.build(dependencies, args),
        }
    }

    fn inject(&self, instance: &Instance, argument: &str, value: Resolution) -> Result<(), DynError> {
        self.wrapped.inject(instance, argument, value)
    }

    fn post_initialize(&self, instance: &Instance) -> Result<(), DynError> {
        self.wrapped.post_initialize(instance)
    }

    fn describe(&self) -> String {
        self.wrapped.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dependency::Dependency, from_fn::FromFn};

    trait Sink: Send + Sync {}
    struct File;
    impl Sink for File {}

    fn report() -> ProducerRef {
        Arc::new(
            FromFn::new(|_, args| Ok(format!("report {}", args.get::<u32>(0)?)))
                .feature("report")
                .dependency("sink", Dependency::on::<dyn Sink>())
                .setter("audit", Dependency::feature("audit").optional(), |_, _| Ok(())),
        )
    }

    fn hierarchy() -> TypeHierarchy {
        let mut hierarchy = TypeHierarchy::new();
        hierarchy.declare::<File, dyn Sink>(|file| file);
        hierarchy
    }

    #[test]
    fn features_are_added_to_the_wrapped_ones() {
        let wrapped = Wrapped::new(report(), WrapOptions::new().features(["pdf", "report"]), &hierarchy()).unwrap();
        let expected: Vec<Feature> = vec!["report".into(), "pdf".into()];
        assert_eq!(wrapped.provided_features(), expected.as_slice());
        assert_eq!(wrapped.provided_type(), TypeInfo::of::<String>());
    }

    #[test]
    fn refinements_narrow_constructor_and_setter_dependencies() {
        let options = WrapOptions::new()
            .refine("sink", Refinement::of::<File>())
            .refine("audit", Refinement::new().required());
        let wrapped = Wrapped::new(report(), options, &hierarchy()).unwrap();

        let sink = &wrapped.constructor_dependencies()["sink"];
        assert_eq!(sink.resolve_type(&hierarchy()).unwrap(), Some(TypeInfo::of::<File>()));
        assert!(!wrapped.setter_dependencies(None)["audit"].is_optional());
    }

    #[test]
    fn refining_an_unknown_argument_fails() {
        let options = WrapOptions::new().refine("missing", Refinement::new());
        let error = Wrapped::new(report(), options, &hierarchy()).err().unwrap();
        assert!(matches!(error, DiError::NoSuchDependency { argument, .. } if argument == "missing"));
    }

    #[test]
    fn fixed_args_are_prepended() {
        let wrapped = Wrapped::new(report(), WrapOptions::new().args(Args::new().push(7u32)), &hierarchy()).unwrap();
        let built = wrapped.build(&Resolved::new(), Args::new()).unwrap();
        assert_eq!(*built.downcast::<String>().unwrap(), "report 7");
    }

    #[test]
    fn custom_construction_replaces_the_build() {
        let options = WrapOptions::new().construct_with(|_, _| Ok(Instance::new(String::from("custom"))));
        let wrapped = Wrapped::new(report(), options, &hierarchy()).unwrap();
        let built = wrapped.build(&Resolved::new(), Args::new()).unwrap();
        assert_eq!(*built.downcast::<String>().unwrap(), "custom");
    }
}
