use std::{
    cell::RefCell,
    iter,
    rc::Rc,
    sync::{Arc, MutexGuard},
};

use crate::{
    curried::CurriedHandle,
    dependency::{Dependencies, Dependency, Selection},
    errors::{DiError, Stage},
    producer::ProducerRef,
    registry::{Catalog, ProducerId, RegistryInner, SingletonCache},
    resolved::{Args, Resolution, Resolved},
    types::{Instance, TypeInfo},
};

type Pending = (ProducerRef, Instance);

/// Objects waiting for the later construction phases
#[derive(Default)]
pub(crate) struct Queues {
    /// Built, setter dependencies not injected yet. Drained last in, first out
    inject: Vec<Pending>,
    /// Fully injected, post initialized in arrival order
    post_initialize: Vec<Pending>,
}

thread_local! {
    /// Sessions running on this thread, by registry id
    static ACTIVE: RefCell<Vec<(u64, Rc<RefCell<Queues>>)>> = const { RefCell::new(Vec::new()) };
}

pub(crate) fn is_active(registry: u64) -> bool {
    ACTIVE.with(|active| active.borrow().iter().any(|(id, _)| *id == registry))
}

fn active_queues(registry: u64) -> Option<Rc<RefCell<Queues>>> {
    ACTIVE.with(|active| {
        active
            .borrow()
            .iter()
            .rev()
            .find(|(id, _)| *id == registry)
            .map(|(_, queues)| queues.clone())
    })
}

/// Marks a session active on this thread for as long as it lives
struct ActiveGuard {
    registry: u64,
}
impl ActiveGuard {
    fn enter(registry: u64, queues: Rc<RefCell<Queues>>) -> Self {
        ACTIVE.with(|active| active.borrow_mut().push((registry, queues)));
        ActiveGuard { registry }
    }
}
impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let _ = ACTIVE.try_with(|active| {
            let mut active = active.borrow_mut();
            if let Some(position) = active.iter().rposition(|(id, _)| *id == self.registry) {
                active.remove(position);
            }
        });
    }
}

/// One top level request against a registry
///
/// Holds the singleton cache for its whole lifetime, so sessions of one registry never overlap.
/// Construction happens in three phases: objects are built depth first along their constructor
/// dependencies, then setter dependencies are injected, then every object is post initialized.
pub(crate) struct Session<'r> {
    registry: &'r Arc<RegistryInner>,
    cache: MutexGuard<'r, SingletonCache>,
    catalog: Arc<Catalog>,
    /// Producers currently resolving constructor dependencies, innermost last
    in_progress: Vec<ProducerId>,
    queues: Rc<RefCell<Queues>>,
    /// Singletons cached by this session, evicted again unless it completes
    stored: Vec<ProducerId>,
    completed: bool,
    /// Objects that went through setter injection so far
    injected: usize,
    _active: ActiveGuard,
}

impl<'r> Session<'r> {
    pub(crate) fn open(registry: &'r Arc<RegistryInner>) -> Result<Self, DiError> {
        if is_active(registry.id) {
            return Err(DiError::ReentrantRequest);
        }
        let cache = registry.lock_cache();
        let catalog = registry.snapshot();
        let queues = Rc::new(RefCell::new(Queues::default()));
        let active = ActiveGuard::enter(registry.id, queues.clone());

        Ok(Session {
            registry,
            cache,
            catalog,
            in_progress: Vec::new(),
            queues,
            stored: Vec::new(),
            completed: false,
            injected: 0,
            _active: active,
        })
    }

    pub(crate) fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Runs the root request, then completes everything it built
    pub(crate) fn run<T>(mut self, root: impl FnOnce(&mut Self) -> Result<T, DiError>) -> Result<T, DiError> {
        let result = root(&mut self).and_then(|value| self.finish().map(|()| value));
        match &result {
            Ok(_) => {
                self.completed = true;
                tracing::debug!("Construction session completed");
            }
            Err(error) => tracing::error!("Construction session aborted: {error}"),
        }
        result
    }

    /// Builds with the producer, cached for singletons when there are no arguments
    pub(crate) fn construct(&mut self, id: ProducerId, args: Args) -> Result<Instance, DiError> {
        match args.is_empty() {
            true => self.construct_without_args(id),
            false => self.construct_with_args(id, args),
        }
    }

    pub(crate) fn construct_dependency(&mut self, dependency: &Dependency, args: &Args) -> Result<Resolution, DiError> {
        let catalog = self.catalog.clone();
        let selection = dependency.select(
            &catalog.producers,
            &catalog.hierarchy,
            &self.registry.config.default_preference,
        )?;
        let target = dependency.delivery_type(&catalog.hierarchy)?;

        let resolution = match selection {
            Selection::Absent => Resolution::Absent,
            Selection::One(index) if dependency.is_handle() => Resolution::Handle(self.curry(ProducerId(index))?),
            Selection::One(index) => {
                let instance = self.construct(ProducerId(index), args.clone())?;
                Resolution::One(self.deliver(instance, target))
            }
            Selection::Many(indices) if dependency.is_handle() => {
                let mut handles = Vec::with_capacity(indices.len());
                for index in indices {
                    handles.push(self.curry(ProducerId(index))?);
                }
                Resolution::Handles(handles)
            }
            Selection::Many(indices) => {
                let mut instances = Vec::with_capacity(indices.len());
                for index in indices {
                    let instance = self.construct(ProducerId(index), args.clone())?;
                    instances.push(self.deliver(instance, target));
                }
                Resolution::Many(instances)
            }
        };
        Ok(resolution)
    }

    /// Builds with a handle's producer, the object completes with this session
    pub(crate) fn build_curried(&mut self, producer: &ProducerRef, dependencies: &Resolved, args: Args) -> Result<Instance, DiError> {
        let instance = build_with(producer, producer.describe(), dependencies, args)?;
        self.enqueue(producer.clone(), instance.clone());
        Ok(instance)
    }

    fn construct_dependencies(&mut self, dependencies: &Dependencies) -> Result<Resolved, DiError> {
        let mut resolved = Resolved::new();
        for (argument, dependency) in dependencies {
            let value = self.construct_dependency(dependency, &Args::new())?;
            resolved.insert(argument.clone(), value);
        }
        Ok(resolved)
    }

    fn construct_without_args(&mut self, id: ProducerId) -> Result<Instance, DiError> {
        if let Some(instance) = self.cache.cached(id) {
            tracing::trace!("Reusing singleton {}", self.catalog.describe(id));
            return Ok(instance.clone());
        }

        self.enter(id)?;
        let built = self.build(id, Args::new());
        self.in_progress.pop();
        let instance = built?;

        if self.cache.is_singleton(id) {
            self.cache.store(id, &instance);
            self.stored.push(id);
        }
        self.enqueue(self.catalog.producers[id.0].clone(), instance.clone());
        Ok(instance)
    }

    fn construct_with_args(&mut self, id: ProducerId, args: Args) -> Result<Instance, DiError> {
        let instance = self.build(id, args)?;
        self.enqueue(self.catalog.producers[id.0].clone(), instance.clone());
        Ok(instance)
    }

    /// Resolves the constructor dependencies, then builds
    fn build(&mut self, id: ProducerId, args: Args) -> Result<Instance, DiError> {
        let producer = self.catalog.producers[id.0].clone();
        let dependencies = self.construct_dependencies(&producer.constructor_dependencies())?;
        let instance = build_with(&producer, self.catalog.describe(id), &dependencies, args)?;
        tracing::debug!("Constructed instance of {}", self.catalog.describe(id));
        Ok(instance)
    }

    fn curry(&mut self, id: ProducerId) -> Result<CurriedHandle, DiError> {
        if self.cache.is_singleton(id) {
            return Err(DiError::IllegalFactoryHandle {
                producer: self.catalog.describe(id),
            });
        }
        let producer = self.catalog.producers[id.0].clone();

        // Resolving a handle's dependencies is part of building whatever needs the handle
        self.enter(id)?;
        let dependencies = self.construct_dependencies(&producer.constructor_dependencies());
        self.in_progress.pop();

        Ok(CurriedHandle::new(producer, dependencies?, Arc::downgrade(self.registry)))
    }

    /// Marks the producer in progress, failing on cycles and runaway nesting
    fn enter(&mut self, id: ProducerId) -> Result<(), DiError> {
        if let Some(start) = self.in_progress.iter().position(|current| *current == id) {
            let cycle = self.in_progress[start..]
                .iter()
                .chain(iter::once(&id))
                .map(|current| self.catalog.describe(*current))
                .collect();
            return Err(DiError::CyclicDependency { cycle });
        }

        let depth = self.registry.config.max_resolution_depth;
        if self.in_progress.len() >= depth {
            return Err(DiError::ResolutionTooDeep { depth });
        }

        self.in_progress.push(id);
        Ok(())
    }

    /// Views the object as the type the dependency asked for
    fn deliver(&self, instance: Instance, target: Option<TypeInfo>) -> Instance {
        let Some(target) = target else {
            return instance;
        };
        match self.catalog.hierarchy.upcast(&instance, target) {
            Some(view) => view,
            None => {
                tracing::warn!("{} was built where {target} was expected", instance.info());
                instance
            }
        }
    }

    fn enqueue(&self, producer: ProducerRef, instance: Instance) {
        self.queues.borrow_mut().inject.push((producer, instance));
    }

    /// Injects and post initializes until nothing is left, post initialization may build more
    fn finish(&mut self) -> Result<(), DiError> {
        loop {
            self.inject_setters()?;

            let ready = std::mem::take(&mut self.queues.borrow_mut().post_initialize);
            if ready.is_empty() {
                return Ok(());
            }
            for (producer, instance) in ready {
                producer.post_initialize(&instance).map_err(|error| {
                    DiError::from_producer(producer.describe(), Stage::PostInitialize, error)
                })?;
            }
        }
    }

    fn inject_setters(&mut self) -> Result<(), DiError> {
        loop {
            let next = self.queues.borrow_mut().inject.pop();
            let Some((producer, instance)) = next else {
                return Ok(());
            };

            // Transient producers injected into each other never run dry
            let limit = self.registry.config.max_session_objects;
            self.injected += 1;
            if self.injected > limit {
                return Err(DiError::SessionTooLarge { limit });
            }

            let setters = producer.setter_dependencies(Some(&instance)).into_owned();
            let mut values = Vec::with_capacity(setters.len());
            for (argument, dependency) in &setters {
                values.push((argument, self.construct_dependency(dependency, &Args::new())?));
            }
            for (argument, value) in values {
                producer.inject(&instance, argument, value).map_err(|error| {
                    let stage = Stage::Inject {
                        argument: argument.clone(),
                    };
                    DiError::from_producer(producer.describe(), stage, error)
                })?;
            }

            self.queues.borrow_mut().post_initialize.push((producer, instance));
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if self.completed || self.stored.is_empty() {
            return;
        }
        tracing::debug!("Evicting {} singletons of the aborted session", self.stored.len());
        for id in self.stored.drain(..) {
            self.cache.evict(id);
        }
    }
}

fn build_with(producer: &ProducerRef, described: String, dependencies: &Resolved, args: Args) -> Result<Instance, DiError> {
    producer
        .build(dependencies, args)
        .map_err(|error| DiError::from_producer(described, Stage::Build, error))
}

/// Builds for a handle, joining the session already running on this thread if there is one
pub(crate) fn build_curried(
    registry: &Arc<RegistryInner>,
    producer: &ProducerRef,
    dependencies: &Resolved,
    args: Args,
) -> Result<Instance, DiError> {
    if let Some(queues) = active_queues(registry.id) {
        let instance = build_with(producer, producer.describe(), dependencies, args)?;
        tracing::trace!("Built {} within the running session", producer.describe());
        queues
            .borrow_mut()
            .inject
            .push((producer.clone(), instance.clone()));
        return Ok(instance);
    }

    Session::open(registry)?.run(|session| session.build_curried(producer, dependencies, args))
}
