use std::{collections::BTreeMap, sync::Arc};

use crate::{
    curried::CurriedHandle,
    errors::RequireError,
    types::{Injectable, Instance},
};

/// What a single dependency resolved to
#[derive(Debug, Clone)]
pub enum Resolution {
    One(Instance),
    /// An optional dependency nothing matched
    Absent,
    Many(Vec<Instance>),
    Handle(CurriedHandle),
    Handles(Vec<CurriedHandle>),
}

impl Resolution {
    pub(crate) fn shape(&self) -> &'static str {
        match self {
            Resolution::One(_) => "one object",
            Resolution::Absent => "nothing",
            Resolution::Many(_) => "a list of objects",
            Resolution::Handle(_) => "a handle",
            Resolution::Handles(_) => "a list of handles",
        }
    }

    /// The single object, if this resolved to one
    pub fn instance(&self) -> Option<&Instance> {
        match self {
            Resolution::One(instance) => Some(instance),
            _ => None,
        }
    }
}

/// Resolved dependencies handed to a producer, keyed by argument name
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    values: BTreeMap<String, Resolution>,
}

impl Resolved {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Resolution) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Adds a resolved value, for building dependency maps by hand
    pub fn with(mut self, name: impl Into<String>, value: Resolution) -> Self {
        self.insert(name, value);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Resolution)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn resolution(&self, name: &str) -> Result<&Resolution, RequireError> {
        self.values
            .get(name)
            .ok_or_else(|| RequireError::Missing(name.to_string()))
    }

    /// The single object supplied under `name`
    pub fn get<T: Injectable + ?Sized>(&self, name: &str) -> Result<Arc<T>, RequireError> {
        match self.resolution(name)? {
            Resolution::One(instance) => downcast(instance),
            other => Err(wrong_shape(name, "one object", other)),
        }
    }

    /// Like [`Resolved::get`] but nothing supplied is not an error
    pub fn optional<T: Injectable + ?Sized>(&self, name: &str) -> Result<Option<Arc<T>>, RequireError> {
        match self.values.get(name) {
            None | Some(Resolution::Absent) => Ok(None),
            Some(Resolution::One(instance)) => downcast(instance).map(Some),
            Some(other) => Err(wrong_shape(name, "one object", other)),
        }
    }

    /// Every object supplied for a multiple dependency
    pub fn many<T: Injectable + ?Sized>(&self, name: &str) -> Result<Vec<Arc<T>>, RequireError> {
        match self.resolution(name)? {
            Resolution::Many(instances) => instances.iter().map(downcast::<T>).collect(),
            Resolution::Absent => Ok(Vec::new()),
            other => Err(wrong_shape(name, "a list of objects", other)),
        }
    }

    pub fn handle(&self, name: &str) -> Result<CurriedHandle, RequireError> {
        match self.resolution(name)? {
            Resolution::Handle(handle) => Ok(handle.clone()),
            other => Err(wrong_shape(name, "a handle", other)),
        }
    }

    pub fn optional_handle(&self, name: &str) -> Result<Option<CurriedHandle>, RequireError> {
        match self.values.get(name) {
            None | Some(Resolution::Absent) => Ok(None),
            Some(Resolution::Handle(handle)) => Ok(Some(handle.clone())),
            Some(other) => Err(wrong_shape(name, "a handle", other)),
        }
    }

    pub fn handles(&self, name: &str) -> Result<Vec<CurriedHandle>, RequireError> {
        match self.resolution(name)? {
            Resolution::Handles(handles) => Ok(handles.clone()),
            Resolution::Absent => Ok(Vec::new()),
            other => Err(wrong_shape(name, "a list of handles", other)),
        }
    }
}

impl FromIterator<(String, Resolution)> for Resolved {
    fn from_iter<I: IntoIterator<Item = (String, Resolution)>>(iter: I) -> Self {
        Resolved {
            values: iter.into_iter().collect(),
        }
    }
}

fn downcast<T: Injectable + ?Sized>(instance: &Instance) -> Result<Arc<T>, RequireError> {
    instance.downcast::<T>().map_err(RequireError::downcast::<T>)
}

fn wrong_shape(name: &str, expected: &'static str, actual: &Resolution) -> RequireError {
    RequireError::WrongShape {
        name: name.to_string(),
        expected,
        actual: actual.shape(),
    }
}

/// Extra arguments passed to a producer alongside its dependencies
#[derive(Debug, Clone, Default)]
pub struct Args {
    positional: Vec<Instance>,
    named: BTreeMap<String, Instance>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument
    pub fn push<T: Injectable>(self, value: T) -> Self {
        self.push_instance(Instance::new(value))
    }

    pub fn push_instance(mut self, instance: Instance) -> Self {
        self.positional.push(instance);
        self
    }

    /// Sets a named argument
    pub fn with<T: Injectable>(self, name: impl Into<String>, value: T) -> Self {
        self.with_instance(name, Instance::new(value))
    }

    pub fn with_instance(mut self, name: impl Into<String>, instance: Instance) -> Self {
        self.named.insert(name.into(), instance);
        self
    }

    pub fn get<T: Injectable + ?Sized>(&self, index: usize) -> Result<Arc<T>, RequireError> {
        let instance = self
            .positional
            .get(index)
            .ok_or(RequireError::Positional(index))?;
        downcast(instance)
    }

    pub fn named<T: Injectable + ?Sized>(&self, name: &str) -> Result<Arc<T>, RequireError> {
        let instance = self
            .named
            .get(name)
            .ok_or_else(|| RequireError::Missing(name.to_string()))?;
        downcast(instance)
    }

    pub fn positional(&self) -> &[Instance] {
        &self.positional
    }

    pub fn keywords(&self) -> &BTreeMap<String, Instance> {
        &self.named
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Places fixed arguments in front, named arguments given by the caller win
    pub(crate) fn prepend(&mut self, fixed: &Args) {
        let mut positional = fixed.positional.clone();
        positional.append(&mut self.positional);
        self.positional = positional;

        for (name, instance) in &fixed.named {
            self.named
                .entry(name.clone())
                .or_insert_with(|| instance.clone());
        }
    }
}
