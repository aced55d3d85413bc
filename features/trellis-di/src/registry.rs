use std::{
    any::type_name,
    collections::HashMap,
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError,
    },
};

use crate::{
    config::RegistryConfig,
    curried::CurriedHandle,
    dependency::Dependency,
    dependency_graph::{DependencyGraph, DependencyGraphErrors},
    errors::{DiError, RequireError},
    hierarchy::{TypeHierarchy, TypeRef},
    producer::ProducerRef,
    resolved::{Args, Resolution},
    session::{self, Session},
    types::{Feature, Injectable, Instance, TypeInfo},
    wrapped::{WrapOptions, Wrapped},
};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(0);

/// Position of a producer in its registry, in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProducerId(pub(crate) usize);
impl ProducerId {
    pub fn index(self) -> usize {
        self.0
    }
}
impl std::fmt::Display for ProducerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a producer is registered
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Name the producer can be requested by
    pub name: Option<String>,
    /// Cache the first built object, falls back to the registry default
    pub singleton: Option<bool>,
}
impl RegisterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = Some(singleton);
        self
    }
}

/// What a request asks for
#[derive(Debug, Clone)]
pub enum Query {
    /// The producer bound to a name
    Name(String),
    Type(TypeRef),
    /// Any producer providing every feature
    Features(Vec<Feature>),
    Dependency(Dependency),
}
impl From<&str> for Query {
    fn from(name: &str) -> Self {
        Query::Name(name.to_string())
    }
}
impl From<String> for Query {
    fn from(name: String) -> Self {
        Query::Name(name)
    }
}
impl From<Dependency> for Query {
    fn from(dependency: Dependency) -> Self {
        Query::Dependency(dependency)
    }
}
impl From<TypeRef> for Query {
    fn from(required_type: TypeRef) -> Self {
        Query::Type(required_type)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EntryInfo {
    pub(crate) name: Option<String>,
    pub(crate) singleton: bool,
}

/// Everything registered, replaced as a whole on registration so sessions work on a snapshot
#[derive(Clone, Default)]
pub(crate) struct Catalog {
    pub(crate) producers: Vec<ProducerRef>,
    pub(crate) entries: Vec<EntryInfo>,
    pub(crate) names: HashMap<String, ProducerId>,
    pub(crate) hierarchy: TypeHierarchy,
}
impl Catalog {
    pub(crate) fn describe(&self, id: ProducerId) -> String {
        match self.entries.get(id.0).and_then(|entry| entry.name.as_ref()) {
            Some(name) => name.clone(),
            None => self.producers[id.0].describe(),
        }
    }
}

pub(crate) enum Slot {
    /// Not a singleton, nothing is ever cached
    Transient,
    /// A singleton that was not built yet
    Pending,
    Built(Instance),
}

/// Singleton objects by producer, the lock around it serializes construction sessions
#[derive(Default)]
pub(crate) struct SingletonCache {
    slots: Vec<Slot>,
}
impl SingletonCache {
    pub(crate) fn is_singleton(&self, id: ProducerId) -> bool {
        matches!(self.slots.get(id.0), Some(Slot::Pending | Slot::Built(_)))
    }

    pub(crate) fn cached(&self, id: ProducerId) -> Option<&Instance> {
        match self.slots.get(id.0) {
            Some(Slot::Built(instance)) => Some(instance),
            _ => None,
        }
    }

    pub(crate) fn store(&mut self, id: ProducerId, instance: &Instance) {
        if let Some(slot @ Slot::Pending) = self.slots.get_mut(id.0) {
            *slot = Slot::Built(instance.clone());
        }
    }

    /// Forgets a singleton so the next request builds it again
    pub(crate) fn evict(&mut self, id: ProducerId) {
        if let Some(slot @ Slot::Built(_)) = self.slots.get_mut(id.0) {
            *slot = Slot::Pending;
        }
    }
}

pub(crate) struct RegistryInner {
    pub(crate) id: u64,
    pub(crate) config: RegistryConfig,
    catalog: RwLock<Arc<Catalog>>,
    cache: Mutex<SingletonCache>,
}
impl RegistryInner {
    pub(crate) fn snapshot(&self) -> Arc<Catalog> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Entries of sessions that did not complete are evicted on drop, a poisoned lock holds no partial state
    pub(crate) fn lock_cache(&self) -> MutexGuard<'_, SingletonCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn modify<R>(&self, change: impl FnOnce(&mut Catalog) -> R) -> R {
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        change(Arc::make_mut(&mut *catalog))
    }
}

/// Holds producers and builds object graphs from them
///
/// Cloning is cheap and shares the same producers and singletons.
#[derive(Clone)]
pub struct Registry(pub(crate) Arc<RegistryInner>);

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Registry(Arc::new(RegistryInner {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            config,
            catalog: RwLock::new(Arc::new(Catalog::default())),
            cache: Mutex::new(SingletonCache::default()),
        }))
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.0.config
    }

    /// Adds a producer, allocating its singleton slot right away
    pub fn register(&self, producer: ProducerRef, options: RegisterOptions) -> Result<ProducerId, DiError> {
        if session::is_active(self.0.id) {
            return Err(DiError::ReentrantRequest);
        }
        let singleton = options.singleton.unwrap_or(self.0.config.default_singleton);

        // Sessions take the cache lock first, holding it keeps them from seeing half a registration
        let mut cache = self.0.lock_cache();
        let id = self.0.modify(|catalog| {
            if let Some(name) = &options.name {
                if catalog.names.contains_key(name) {
                    return Err(DiError::DuplicateName(name.clone()));
                }
            }

            let id = ProducerId(catalog.producers.len());
            catalog.hierarchy.know(producer.provided_type());
            if let Some(name) = &options.name {
                catalog.names.insert(name.clone(), id);
            }
            catalog.producers.push(producer.clone());
            catalog.entries.push(EntryInfo {
                name: options.name.clone(),
                singleton,
            });
            Ok(id)
        })?;
        cache.slots.push(match singleton {
            true => Slot::Pending,
            false => Slot::Transient,
        });

        tracing::debug!(
            "Registered {} as {id} ({})",
            producer.describe(),
            if singleton { "singleton" } else { "transient" }
        );
        Ok(id)
    }

    /// Declares `Sub` a subtype of `Super`, see [`TypeHierarchy::declare`]
    pub fn declare_subtype<Sub, Super>(&self, cast: impl Fn(Arc<Sub>) -> Arc<Super> + Send + Sync + 'static)
    where
        Sub: Injectable + ?Sized,
        Super: Injectable + ?Sized,
    {
        self.0.modify(|catalog| catalog.hierarchy.declare::<Sub, Super>(cast));
    }

    /// Makes a type resolvable by name for late bound dependencies
    pub fn alias<T: ?Sized + 'static>(&self, name: impl Into<String>) {
        self.0.modify(|catalog| catalog.hierarchy.alias::<T>(name));
    }

    pub fn hierarchy(&self) -> TypeHierarchy {
        self.0.snapshot().hierarchy.clone()
    }

    /// Decorates a producer using this registry's type hierarchy
    pub fn wrap(&self, producer: ProducerRef, options: WrapOptions) -> Result<Wrapped, DiError> {
        Wrapped::new(producer, options, &self.0.snapshot().hierarchy)
    }

    pub fn len(&self) -> usize {
        self.0.snapshot().producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn producer(&self, id: ProducerId) -> Option<ProducerRef> {
        self.0.snapshot().producers.get(id.0).cloned()
    }

    /// The producer bound to `name`
    pub fn lookup(&self, name: &str) -> Option<ProducerRef> {
        let catalog = self.0.snapshot();
        let id = catalog.names.get(name)?;
        catalog.producers.get(id.0).cloned()
    }

    pub fn is_singleton(&self, id: ProducerId) -> bool {
        self.0
            .snapshot()
            .entries
            .get(id.0)
            .is_some_and(|entry| entry.singleton)
    }

    /// Builds what the query asks for within one construction session
    ///
    /// Arguments are handed to the producers selected by the query, which makes their objects
    /// uncached. Everything built during the request is fully injected and post initialized
    /// before this returns, an error aborts the whole request.
    pub fn request(&self, query: impl Into<Query>, args: Args) -> Result<Resolution, DiError> {
        let query = query.into();
        tracing::debug!("Requesting {query:?}");

        Session::open(&self.0)?.run(|session| match &query {
            Query::Name(name) => {
                let id = session
                    .catalog()
                    .names
                    .get(name)
                    .copied()
                    .ok_or_else(|| DiError::UnknownName(name.clone()))?;
                session.construct(id, args).map(Resolution::One)
            }
            Query::Type(required_type) => {
                session.construct_dependency(&Dependency::on_type(required_type.clone()), &args)
            }
            Query::Features(features) => {
                session.construct_dependency(&Dependency::any().with_features(features.iter().cloned()), &args)
            }
            Query::Dependency(dependency) => session.construct_dependency(dependency, &args),
        })
    }

    pub fn query(&self, query: impl Into<Query>) -> Result<Resolution, DiError> {
        self.request(query, Args::new())
    }

    /// Builds with the producer bound to `name`
    pub fn call(&self, name: &str, args: Args) -> Result<Instance, DiError> {
        match self.request(name, args)? {
            Resolution::One(instance) => Ok(instance),
            other => Err(wrong_shape(name, "one object", &other).into()),
        }
    }

    /// Like [`Registry::call`], viewing the object as `T`
    pub fn call_as<T: Injectable + ?Sized>(&self, name: &str, args: Args) -> Result<Arc<T>, DiError> {
        let instance = self.call(name, args)?;
        let instance = self
            .0
            .snapshot()
            .hierarchy
            .upcast(&instance, TypeInfo::of::<T>())
            .unwrap_or(instance);
        Ok(instance
            .downcast::<T>()
            .map_err(RequireError::downcast::<T>)?)
    }

    /// The object bound to `name`
    pub fn named<T: Injectable + ?Sized>(&self, name: &str) -> Result<Arc<T>, DiError> {
        self.call_as(name, Args::new())
    }

    /// The one `T` this registry provides
    pub fn get<T: Injectable + ?Sized>(&self) -> Result<Arc<T>, DiError> {
        match self.query(Dependency::on::<T>())? {
            Resolution::One(instance) => downcast(&instance),
            other => Err(wrong_shape(type_name::<T>(), "one object", &other).into()),
        }
    }

    pub fn optional<T: Injectable + ?Sized>(&self) -> Result<Option<Arc<T>>, DiError> {
        match self.query(Dependency::on::<T>().optional())? {
            Resolution::One(instance) => downcast(&instance).map(Some),
            Resolution::Absent => Ok(None),
            other => Err(wrong_shape(type_name::<T>(), "one object", &other).into()),
        }
    }

    /// Every `T` this registry provides, in registration order
    pub fn all<T: Injectable + ?Sized>(&self) -> Result<Vec<Arc<T>>, DiError> {
        match self.query(Dependency::on::<T>().multiple().optional())? {
            Resolution::Many(instances) => instances.iter().map(downcast::<T>).collect(),
            other => Err(wrong_shape(type_name::<T>(), "a list of objects", &other).into()),
        }
    }

    /// A handle building fresh `T`s on demand
    pub fn handle<T: Injectable + ?Sized>(&self) -> Result<CurriedHandle, DiError> {
        match self.query(Dependency::on::<T>().handle())? {
            Resolution::Handle(handle) => Ok(handle),
            other => Err(wrong_shape(type_name::<T>(), "a handle", &other).into()),
        }
    }

    /// A callable bound to the producer named `name`
    pub fn accessor(&self, name: &str) -> Result<Accessor, DiError> {
        if !self.0.snapshot().names.contains_key(name) {
            return Err(DiError::UnknownName(name.to_string()));
        }
        Ok(Accessor {
            registry: self.clone(),
            name: name.to_string(),
        })
    }

    pub fn graph(&self) -> DependencyGraph {
        DependencyGraph::new(self)
    }

    /// Checks every declared dependency without building anything
    pub fn validate(&self) -> Result<(), DependencyGraphErrors> {
        self.graph().check()
    }

    pub(crate) fn snapshot(&self) -> Arc<Catalog> {
        self.0.snapshot()
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let catalog = self.0.snapshot();
        // A session on this thread may hold the cache
        let cache = match self.0.cache.try_lock() {
            Ok(cache) => Some(cache),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        };
        let mut map = f.debug_map();
        for index in 0..catalog.producers.len() {
            let id = ProducerId(index);
            let state = match cache.as_ref().and_then(|cache| cache.slots.get(index)) {
                Some(Slot::Built(_)) => "built",
                Some(Slot::Pending) => "pending",
                Some(Slot::Transient) => "transient",
                None => "busy",
            };
            map.entry(&catalog.describe(id), &state);
        }
        map.finish()
    }
}

fn downcast<T: Injectable + ?Sized>(instance: &Instance) -> Result<Arc<T>, DiError> {
    Ok(instance
        .downcast::<T>()
        .map_err(RequireError::downcast::<T>)?)
}

fn wrong_shape(name: &str, expected: &'static str, actual: &Resolution) -> RequireError {
    RequireError::WrongShape {
        name: name.to_string(),
        expected,
        actual: actual.shape(),
    }
}

/// Callable bound to a named producer of a registry
#[derive(Clone, Debug)]
pub struct Accessor {
    registry: Registry,
    name: String,
}
impl Accessor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: Args) -> Result<Instance, DiError> {
        self.registry.call(&self.name, args)
    }

    pub fn call_as<T: Injectable + ?Sized>(&self, args: Args) -> Result<Arc<T>, DiError> {
        self.registry.call_as(&self.name, args)
    }
}
