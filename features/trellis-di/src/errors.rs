use thiserror::Error;

use crate::types::{DynError, TypeInfo};

/// Errors raised while registering producers or constructing objects
#[derive(Error, Debug)]
pub enum DiError {
    /// No producer matches a required dependency
    #[error("No producer matches {dependency}")]
    DependencyNotFound { dependency: String },

    /// More than one producer matches and the preferences could not decide
    #[error("More than one producer matches {dependency} and preferences cannot decide between {candidates:?}")]
    AmbiguousDependency {
        dependency: String,
        candidates: Vec<String>,
    },

    /// The constructor dependencies of a producer lead back to itself
    #[error("Cyclic constructor dependencies: {} - Consider turning one of them into a setter dependency", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A handle was requested for a producer whose objects are cached
    #[error("'{producer}' is a singleton and cannot be supplied as a producer handle")]
    IllegalFactoryHandle { producer: String },

    /// A name was bound twice
    #[error("The name '{0}' is already bound to a producer")]
    DuplicateName(String),

    /// A decorator refined an argument the wrapped producer does not declare
    #[error("'{producer}' declares no dependency named '{argument}'")]
    NoSuchDependency { producer: String, argument: String },

    /// A producer failed while building, injecting or post initializing
    #[error("'{producer}' failed during {stage}: {source}")]
    ConstructionFailure {
        producer: String,
        stage: Stage,
        #[source]
        source: DynError,
    },

    /// No producer is bound to the requested name
    #[error("No producer is bound to the name '{0}'")]
    UnknownName(String),

    /// A late bound type name could not be resolved
    #[error("The type name '{0}' cannot be resolved")]
    UnknownType(String),

    /// A refinement asked for a type unrelated to the existing requirement
    #[error("Cannot refine a requirement on '{existing}' to '{requested}'")]
    IncompatibleRefinement {
        existing: TypeInfo,
        requested: TypeInfo,
    },

    /// Constructor dependencies nested deeper than allowed
    #[error("Constructor dependencies nest deeper than {depth} levels")]
    ResolutionTooDeep { depth: usize },

    /// One request set more objects up than allowed, usually transient producers injected into each other
    #[error("A single request injected more than {limit} objects, check for setter dependencies between transient producers")]
    SessionTooLarge { limit: usize },

    /// The registry was asked for objects from inside one of its own sessions
    #[error("The registry was queried from inside one of its own construction sessions, declare a dependency instead")]
    ReentrantRequest,

    /// A handle outlived the registry it was created from
    #[error("The registry behind this handle has been dropped")]
    RegistryDropped,

    #[error(transparent)]
    Require(#[from] RequireError),
}

impl DiError {
    /// Wraps a producer failure, engine errors raised by nested requests pass through unchanged
    pub(crate) fn from_producer(producer: String, stage: Stage, error: DynError) -> Self {
        match error.downcast::<DiError>() {
            Ok(error) => *error,
            Err(source) => DiError::ConstructionFailure {
                producer,
                stage,
                source,
            },
        }
    }
}

/// Lifecycle step a producer was in when it failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Build,
    Inject { argument: String },
    PostInitialize,
}
impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Build => f.write_str("build"),
            Stage::Inject { argument } => write!(f, "injection of '{argument}'"),
            Stage::PostInitialize => f.write_str("post initialization"),
        }
    }
}

/// Errors when reading resolved dependencies or arguments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequireError {
    /// Nothing was supplied under this name
    #[error("No dependency named '{0}' was supplied")]
    Missing(String),

    #[error("No positional argument at index {0}")]
    Positional(usize),

    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },

    /// The value has a different cardinality than was asked for
    #[error("'{name}' holds {actual}, expected {expected}")]
    WrongShape {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The value does not satisfy the declared dependency
    #[error("'{name}' does not satisfy {dependency}")]
    Unsatisfied { name: String, dependency: String },
}

impl RequireError {
    pub(crate) fn downcast<T: ?Sized>(actual_type: &'static str) -> Self {
        RequireError::DowncastFailed {
            required_type: std::any::type_name::<T>(),
            actual_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_pass_through_producer_failures() {
        let nested: DynError = Box::new(DiError::UnknownName("db".into()));
        let error = DiError::from_producer("service".into(), Stage::Build, nested);
        assert!(matches!(error, DiError::UnknownName(name) if name == "db"));
    }

    #[test]
    fn foreign_errors_are_wrapped_with_their_stage() {
        let error = DiError::from_producer(
            "service".into(),
            Stage::Inject {
                argument: "logger".into(),
            },
            "broken".into(),
        );
        assert_eq!(
            error.to_string(),
            "'service' failed during injection of 'logger': broken"
        );
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn cycles_are_listed_in_order() {
        let error = DiError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert!(error.to_string().contains("a -> b -> a"));
    }
}
