//! Object graph construction from registered producers.
//!
//! Producers declare what they provide (a type and a set of features) and what they need.
//! A [`Registry`] matches the needs against what is registered and builds whole object graphs
//! on request:
//!
//! 1. Constructor dependencies are resolved depth first and handed to the producer's build.
//! 2. Setter dependencies are injected into the built objects afterwards, which allows cycles.
//! 3. Every object built during the request is post initialized once all injection is done.
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_di::{Dependency, FromFn, Registration, Registry};
//!
//! struct Database {
//!     url: Arc<String>,
//! }
//!
//! let registry = Registry::new();
//! registry.add(Registration::instance(String::from("postgres://localhost")))?;
//! registry.add(Registration::producer(
//!     FromFn::new(|dependencies, _| Ok(Database { url: dependencies.get("url")? }))
//!         .dependency("url", Dependency::on::<String>()),
//! ))?;
//!
//! let database = registry.get::<Database>()?;
//! assert_eq!(database.url.as_str(), "postgres://localhost");
//! # Ok::<(), trellis_di::DiError>(())
//! ```

pub mod config;
pub mod curried;
pub mod dependency;
pub mod dependency_graph;
pub mod errors;
pub mod from_fn;
pub mod from_instance;
pub mod hierarchy;
pub mod producer;
pub mod registration;
pub mod registry;
pub mod resolved;
mod session;
pub mod types;
pub mod wire;
pub mod wrapped;

pub use config::RegistryConfig;
pub use curried::CurriedHandle;
pub use dependency::{Cardinality, Dependencies, Dependency, Refinement, Selection};
pub use dependency_graph::{DependencyGraph, DependencyGraphError, DependencyGraphErrors, EdgeKind};
pub use errors::{DiError, RequireError, Stage};
pub use from_fn::FromFn;
pub use from_instance::FromInstance;
pub use hierarchy::{TypeHierarchy, TypeRef};
pub use producer::{Producer, ProducerRef};
pub use registration::Registration;
pub use registry::{Accessor, ProducerId, Query, RegisterOptions, Registry};
pub use resolved::{Args, Resolution, Resolved};
pub use types::{DynError, Feature, Injectable, Instance, Object, TypeInfo, DEFAULT_FEATURE};
pub use wire::{Declaration, Wire, Wired};
pub use wrapped::{WrapOptions, Wrapped};
