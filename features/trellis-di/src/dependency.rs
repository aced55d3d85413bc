use std::collections::BTreeMap;

use crate::{
    errors::{DiError, RequireError},
    hierarchy::{TypeHierarchy, TypeRef},
    producer::{Producer, ProducerRef},
    resolved::Resolution,
    types::{merge_features, Feature, TypeInfo},
};

/// Dependencies of a producer keyed by argument name
pub type Dependencies = BTreeMap<String, Dependency>;

/// How many producers a dependency binds to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cardinality {
    /// Exactly one producer, ties are broken by the preferred features.
    /// `None` falls back to the registry's default preference.
    Single { prefer: Option<Vec<Feature>> },
    /// Every matching producer, in registration order
    Multiple,
}

/// Describes what a producer needs: a type, a set of features, and how the match is delivered
#[derive(Debug, Clone)]
pub struct Dependency {
    required_type: Option<TypeRef>,
    required_features: Vec<Feature>,
    cardinality: Cardinality,
    optional: bool,
    handle: bool,
    /// Type matches are handed over as, kept from before a refinement narrowed the requirement
    delivered_as: Option<TypeRef>,
}

/// Outcome of matching a dependency against the registered producers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Absent,
    One(usize),
    Many(Vec<usize>),
}

impl Dependency {
    /// Matches any producer
    pub fn any() -> Self {
        Dependency {
            required_type: None,
            required_features: Vec::new(),
            cardinality: Cardinality::Single { prefer: None },
            optional: false,
            handle: false,
            delivered_as: None,
        }
    }

    /// Matches producers of `T` or one of its declared subtypes
    pub fn on<T: ?Sized + 'static>() -> Self {
        Self::on_type(TypeRef::of::<T>())
    }

    pub fn on_type(required_type: TypeRef) -> Self {
        Dependency {
            required_type: Some(required_type),
            ..Self::any()
        }
    }

    /// Requires a type known by name, resolved when the dependency is first matched
    pub fn named_type(name: impl Into<String>) -> Self {
        Self::on_type(TypeRef::named(name))
    }

    /// Matches producers providing the feature
    pub fn feature(feature: impl Into<Feature>) -> Self {
        Self::any().with_feature(feature)
    }

    pub fn with_feature(mut self, feature: impl Into<Feature>) -> Self {
        merge_features(&mut self.required_features, [feature]);
        self
    }

    pub fn with_features<F: Into<Feature>>(mut self, features: impl IntoIterator<Item = F>) -> Self {
        merge_features(&mut self.required_features, features);
        self
    }

    /// Resolve to nothing instead of failing when no producer matches
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Resolve to every matching producer
    pub fn multiple(mut self) -> Self {
        self.cardinality = Cardinality::Multiple;
        self
    }

    /// Deliver a handle that builds on demand instead of a built object
    pub fn handle(mut self) -> Self {
        self.handle = true;
        self
    }

    /// Features used to break ties, ignored for multiple dependencies
    pub fn prefer<F: Into<Feature>>(mut self, features: impl IntoIterator<Item = F>) -> Self {
        if self.is_multiple() {
            tracing::warn!(dependency = %self, "Ignoring preferences on a multiple dependency");
            return self;
        }
        let mut preferred = Vec::new();
        merge_features(&mut preferred, features);
        self.cardinality = Cardinality::Single {
            prefer: Some(preferred),
        };
        self
    }

    pub fn required_type(&self) -> Option<&TypeRef> {
        self.required_type.as_ref()
    }

    pub fn required_features(&self) -> &[Feature] {
        &self.required_features
    }

    pub fn cardinality(&self) -> &Cardinality {
        &self.cardinality
    }

    pub fn is_multiple(&self) -> bool {
        self.cardinality == Cardinality::Multiple
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_handle(&self) -> bool {
        self.handle
    }

    /// Resolves the required type, `None` when any type will do
    pub fn resolve_type(&self, hierarchy: &TypeHierarchy) -> Result<Option<TypeInfo>, DiError> {
        self.required_type
            .as_ref()
            .map(|required| required.resolve(hierarchy))
            .transpose()
    }

    /// Type the matched objects are viewed as when delivered, `None` delivers them as built
    pub fn delivery_type(&self, hierarchy: &TypeHierarchy) -> Result<Option<TypeInfo>, DiError> {
        match &self.delivered_as {
            Some(delivered_as) => delivered_as.resolve(hierarchy).map(Some),
            None => self.resolve_type(hierarchy),
        }
    }

    /// Whether the producer provides the required type and every required feature
    pub fn matches(&self, producer: &dyn Producer, hierarchy: &TypeHierarchy) -> Result<bool, DiError> {
        if let Some(required) = self.resolve_type(hierarchy)? {
            if !hierarchy.is_subtype(producer.provided_type(), required) {
                return Ok(false);
            }
        }
        let provided = producer.provided_features();
        Ok(self
            .required_features
            .iter()
            .all(|feature| provided.contains(feature)))
    }

    /// Picks the producers this dependency binds to
    pub fn select(
        &self,
        producers: &[ProducerRef],
        hierarchy: &TypeHierarchy,
        default_preference: &[Feature],
    ) -> Result<Selection, DiError> {
        let mut candidates = Vec::new();
        for (index, producer) in producers.iter().enumerate() {
            if self.matches(producer.as_ref(), hierarchy)? {
                candidates.push(index);
            }
        }

        let prefer = match &self.cardinality {
            Cardinality::Multiple => {
                if candidates.is_empty() && !self.optional {
                    return Err(self.not_found());
                }
                return Ok(Selection::Many(candidates));
            }
            Cardinality::Single { prefer } => prefer.as_deref().unwrap_or(default_preference),
        };

        match candidates.as_slice() {
            [] if self.optional => Ok(Selection::Absent),
            [] => Err(self.not_found()),
            [only] => Ok(Selection::One(*only)),
            _ => {
                let score = |index: usize| {
                    let provided = producers[index].provided_features();
                    prefer
                        .iter()
                        .filter(|feature| provided.contains(feature))
                        .count()
                };
                let best = candidates.iter().map(|index| score(*index)).max().unwrap_or(0);
                let winners: Vec<usize> = candidates
                    .iter()
                    .copied()
                    .filter(|index| score(*index) == best)
                    .collect();

                match winners.as_slice() {
                    [winner] => Ok(Selection::One(*winner)),
                    _ => Err(DiError::AmbiguousDependency {
                        dependency: self.to_string(),
                        candidates: winners
                            .iter()
                            .map(|index| producers[*index].describe())
                            .collect(),
                    }),
                }
            }
        }
    }

    /// Narrows this dependency, producing a new descriptor
    ///
    /// A requested type must be a subtype of the existing requirement, features accumulate.
    pub fn with_options(&self, refinement: &Refinement, hierarchy: &TypeHierarchy) -> Result<Dependency, DiError> {
        let mut refined = self.clone();

        if let Some(requested) = &refinement.required_type {
            let requested = requested.resolve(hierarchy)?;
            if let Some(existing) = self.resolve_type(hierarchy)? {
                if !hierarchy.is_subtype(requested, existing) {
                    return Err(DiError::IncompatibleRefinement { existing, requested });
                }
                refined.delivered_as.get_or_insert(TypeRef::Resolved(existing));
            }
            refined.required_type = Some(TypeRef::Resolved(requested));
        }

        merge_features(&mut refined.required_features, refinement.features.iter().cloned());

        if refinement.required {
            refined.optional = false;
        }
        if let Some(prefer) = &refinement.prefer {
            refined = refined.prefer(prefer.iter().cloned());
        }

        Ok(refined)
    }

    /// Checks a supplied value against this dependency
    pub fn check(&self, name: &str, value: &Resolution, hierarchy: &TypeHierarchy) -> Result<(), RequireError> {
        let shape_error = |expected: &'static str| RequireError::WrongShape {
            name: name.to_string(),
            expected,
            actual: value.shape(),
        };

        match (value, self.handle, self.is_multiple()) {
            (Resolution::Absent, _, false) if self.optional => Ok(()),
            (Resolution::Handle(_), true, false) | (Resolution::Handles(_), true, true) => Ok(()),
            (Resolution::One(instance), false, false) => self.check_type(name, instance.info(), hierarchy),
            (Resolution::Many(instances), false, true) => {
                if instances.is_empty() && !self.optional {
                    return Err(shape_error("at least one object"));
                }
                instances
                    .iter()
                    .try_for_each(|instance| self.check_type(name, instance.info(), hierarchy))
            }
            (_, true, false) => Err(shape_error("a handle")),
            (_, true, true) => Err(shape_error("a list of handles")),
            (_, false, false) => Err(shape_error("one object")),
            (_, false, true) => Err(shape_error("a list of objects")),
        }
    }

    fn check_type(&self, name: &str, provided: TypeInfo, hierarchy: &TypeHierarchy) -> Result<(), RequireError> {
        let unsatisfied = || RequireError::Unsatisfied {
            name: name.to_string(),
            dependency: self.to_string(),
        };
        match self.resolve_type(hierarchy) {
            Ok(Some(required)) if !hierarchy.is_subtype(provided, required) => Err(unsatisfied()),
            Ok(_) => Ok(()),
            Err(_) => Err(unsatisfied()),
        }
    }

    fn not_found(&self) -> DiError {
        DiError::DependencyNotFound {
            dependency: self.to_string(),
        }
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.required_type {
            Some(required) => write!(f, "type '{required}'")?,
            None => f.write_str("any type")?,
        }
        if !self.required_features.is_empty() {
            let features: Vec<&str> = self.required_features.iter().map(Feature::as_str).collect();
            write!(f, " with features [{}]", features.join(", "))?;
        }
        if self.is_multiple() {
            f.write_str(", multiple")?;
        }
        if self.optional {
            f.write_str(", optional")?;
        }
        if self.handle {
            f.write_str(", as handle")?;
        }
        Ok(())
    }
}

/// Options that narrow an existing dependency
#[derive(Debug, Clone, Default)]
pub struct Refinement {
    required_type: Option<TypeRef>,
    features: Vec<Feature>,
    required: bool,
    prefer: Option<Vec<Feature>>,
}

impl Refinement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a subtype of the existing requirement
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new().required_type(TypeRef::of::<T>())
    }

    pub fn required_type(mut self, required_type: TypeRef) -> Self {
        self.required_type = Some(required_type);
        self
    }

    pub fn feature(mut self, feature: impl Into<Feature>) -> Self {
        merge_features(&mut self.features, [feature]);
        self
    }

    pub fn features<F: Into<Feature>>(mut self, features: impl IntoIterator<Item = F>) -> Self {
        merge_features(&mut self.features, features);
        self
    }

    /// Turns an optional dependency into a required one
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn prefer<F: Into<Feature>>(mut self, features: impl IntoIterator<Item = F>) -> Self {
        let mut preferred = Vec::new();
        merge_features(&mut preferred, features);
        self.prefer = Some(preferred);
        self
    }
}
