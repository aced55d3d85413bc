use std::{
    any::TypeId,
    collections::{HashMap, VecDeque},
    sync::{Arc, OnceLock},
};

use crate::{
    errors::DiError,
    types::{Injectable, Instance, TypeInfo},
};

type Upcast = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;

/// Subtype relation between types, plus the casts that turn a value into its supertype view.
///
/// Rust has no inheritance, so the relation is declared explicitly, typically once per
/// implemented trait:
///
/// ```rust
/// # use std::sync::Arc;
/// # use trellis_di::TypeHierarchy;
/// trait Logger: Send + Sync {}
/// struct Console;
/// impl Logger for Console {}
///
/// let mut hierarchy = TypeHierarchy::new();
/// hierarchy.declare::<Console, dyn Logger>(|console| console);
/// ```
#[derive(Clone, Default)]
pub struct TypeHierarchy {
    supertypes: HashMap<TypeId, Vec<(TypeInfo, Upcast)>>,
    names: HashMap<String, TypeInfo>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `Sub` a subtype of `Super`
    pub fn declare<Sub, Super>(
        &mut self,
        cast: impl Fn(Arc<Sub>) -> Arc<Super> + Send + Sync + 'static,
    ) where
        Sub: Injectable + ?Sized,
        Super: Injectable + ?Sized,
    {
        let sub = TypeInfo::of::<Sub>();
        let sup = TypeInfo::of::<Super>();
        self.know(sub);
        self.know(sup);

        let upcast: Upcast = Arc::new(move |instance: &Instance| {
            instance
                .downcast::<Sub>()
                .ok()
                .map(|value| Instance::from_arc(cast(value)))
        });

        let supertypes = self.supertypes.entry(sub.type_id).or_default();
        supertypes.retain(|(existing, _)| *existing != sup);
        supertypes.push((sup, upcast));
    }

    /// Makes a type resolvable under its full type name
    pub fn know(&mut self, info: TypeInfo) {
        self.names.entry(info.type_name.to_string()).or_insert(info);
    }

    /// Makes a type resolvable under a short name
    pub fn alias<T: ?Sized + 'static>(&mut self, name: impl Into<String>) {
        self.names.insert(name.into(), TypeInfo::of::<T>());
    }

    /// Resolves a type name, aliases first
    pub fn lookup(&self, name: &str) -> Option<TypeInfo> {
        self.names.get(name).copied()
    }

    /// Whether `sub` equals `sup` or is declared (transitively) a subtype of it
    pub fn is_subtype(&self, sub: TypeInfo, sup: TypeInfo) -> bool {
        self.path(sub, sup).is_some()
    }

    /// Views the instance as `target`, following the declared casts
    pub fn upcast(&self, instance: &Instance, target: TypeInfo) -> Option<Instance> {
        let steps = self.path(instance.info(), target)?;
        steps
            .iter()
            .try_fold(instance.clone(), |current, step| step(&current))
    }

    /// Breadth first search for the shortest chain of casts from `from` to `to`
    fn path(&self, from: TypeInfo, to: TypeInfo) -> Option<Vec<Upcast>> {
        if from == to || to.is_root() {
            return Some(Vec::new());
        }

        let mut previous: HashMap<TypeId, (TypeId, Upcast)> = HashMap::new();
        let mut queue = VecDeque::from([from.type_id]);

        while let Some(current) = queue.pop_front() {
            for (sup, upcast) in self.supertypes.get(&current).into_iter().flatten() {
                if sup.type_id == from.type_id || previous.contains_key(&sup.type_id) {
                    continue;
                }
                previous.insert(sup.type_id, (current, upcast.clone()));

                if *sup == to {
                    let mut steps = Vec::new();
                    let mut cursor = to.type_id;
                    while let Some((before, step)) = previous.get(&cursor) {
                        steps.push(step.clone());
                        cursor = *before;
                    }
                    steps.reverse();
                    return Some(steps);
                }

                queue.push_back(sup.type_id);
            }
        }

        None
    }
}

impl std::fmt::Debug for TypeHierarchy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (sub, supertypes) in &self.supertypes {
            let names: Vec<_> = supertypes.iter().map(|(sup, _)| sup.type_name).collect();
            map.entry(sub, &names);
        }
        map.finish()
    }
}

/// A type requirement, either known up front or named and resolved on first use
#[derive(Debug, Clone)]
pub enum TypeRef {
    Resolved(TypeInfo),
    Named {
        name: Arc<str>,
        resolved: Arc<OnceLock<TypeInfo>>,
    },
}

impl TypeRef {
    pub fn of<T: ?Sized + 'static>() -> Self {
        TypeRef::Resolved(TypeInfo::of::<T>())
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named {
            name: Arc::from(name.into()),
            resolved: Arc::new(OnceLock::new()),
        }
    }

    /// Resolves the reference, a named reference remembers the outcome once it succeeded
    pub fn resolve(&self, hierarchy: &TypeHierarchy) -> Result<TypeInfo, DiError> {
        match self {
            TypeRef::Resolved(info) => Ok(*info),
            TypeRef::Named { name, resolved } => {
                if let Some(info) = resolved.get() {
                    return Ok(*info);
                }
                let info = hierarchy
                    .lookup(name)
                    .ok_or_else(|| DiError::UnknownType(name.to_string()))?;
                Ok(*resolved.get_or_init(|| info))
            }
        }
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeRef::Resolved(info) => write!(f, "{info}"),
            TypeRef::Named { name, .. } => f.write_str(name),
        }
    }
}
