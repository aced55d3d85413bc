use std::{
    any::{Any, TypeId},
    borrow::Cow,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// Error type producers may fail with
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Instances may be shared between threads once built,
/// so anything injectable needs to be Send + Sync + 'static
pub trait Injectable: Send + Sync + 'static {}
impl<T: Send + Sync + 'static + ?Sized> Injectable for T {}

/// Marker for the root of the type hierarchy.
///
/// Every type is a subtype of `Object`, a dependency without a type requirement asks for it.
pub enum Object {}

/// A built object of some producer.
///
/// The value is kept as `Arc<T>` so that unsized values (`dyn Trait`) can be handed out as well.
#[derive(Clone)]
pub struct Instance {
    info: TypeInfo,
    /// Holds an `Arc<T>` where `T` is described by `info`
    value: Arc<dyn Any + Send + Sync>,
    /// Address of the shared value, identical for every view of the same object
    address: usize,
}

impl Instance {
    pub fn new<T: Injectable>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Injectable + ?Sized>(value: Arc<T>) -> Self {
        let address = Arc::as_ptr(&value).cast::<()>() as usize;
        Instance {
            info: TypeInfo::of::<T>(),
            value: Arc::new(value),
            address,
        }
    }

    /// Type the instance is currently viewed as
    pub fn info(&self) -> TypeInfo {
        self.info
    }

    /// Returns the shared value, or the name of the actual type on mismatch
    pub fn downcast<T: Injectable + ?Sized>(&self) -> Result<Arc<T>, &'static str> {
        match self.value.downcast_ref::<Arc<T>>() {
            Some(value) => Ok(value.clone()),
            None => Err(self.info.type_name),
        }
    }

    /// Whether both instances refer to the same object, even when viewed as different types
    pub fn same(a: &Instance, b: &Instance) -> bool {
        a.address == b.address
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.info.type_name)
            .finish()
    }
}

/// Type Name and Type Id
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
}
impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            return f.write_str("Object");
        }
        f.write_str(self.type_name)
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }

    /// The root type, every other type is a subtype of it
    pub fn root() -> TypeInfo {
        TypeInfo::of::<Object>()
    }

    pub fn is_root(&self) -> bool {
        self.type_id == TypeId::of::<Object>()
    }
}

/// Tag a producer advertises, used to select between producers of compatible types
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Feature(Cow<'static, str>);

/// Feature preferred when nothing else decides between candidates
pub const DEFAULT_FEATURE: Feature = Feature(Cow::Borrowed("default"));

impl Feature {
    pub const fn new(name: &'static str) -> Self {
        Feature(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<&'static str> for Feature {
    fn from(name: &'static str) -> Self {
        Feature(Cow::Borrowed(name))
    }
}
impl From<String> for Feature {
    fn from(name: String) -> Self {
        Feature(Cow::Owned(name))
    }
}
impl From<&String> for Feature {
    fn from(name: &String) -> Self {
        Feature(Cow::Owned(name.clone()))
    }
}
impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collects features into a list without duplicates, keeping the first occurrence
pub(crate) fn merge_features<I, F>(features: &mut Vec<Feature>, more: I)
where
    I: IntoIterator<Item = F>,
    F: Into<Feature>,
{
    for feature in more {
        let feature = feature.into();
        if !features.contains(&feature) {
            features.push(feature);
        }
    }
}
