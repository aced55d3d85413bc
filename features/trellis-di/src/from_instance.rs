use std::sync::Arc;

use crate::{
    producer::Producer,
    resolved::{Args, Resolved},
    types::{merge_features, DynError, Feature, Injectable, Instance, TypeInfo},
};

/// Producer that always hands out one existing object
pub struct FromInstance {
    instance: Instance,
    features: Vec<Feature>,
}

impl FromInstance {
    pub fn new<T: Injectable>(value: T) -> Self {
        Self::from_instance(Instance::new(value))
    }

    pub fn shared<T: Injectable + ?Sized>(value: Arc<T>) -> Self {
        Self::from_instance(Instance::from_arc(value))
    }

    pub fn from_instance(instance: Instance) -> Self {
        FromInstance {
            instance,
            features: Vec::new(),
        }
    }

    pub fn with_features<F: Into<Feature>>(mut self, features: impl IntoIterator<Item = F>) -> Self {
        merge_features(&mut self.features, features);
        self
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}

impl Producer for FromInstance {
    fn provided_type(&self) -> TypeInfo {
        self.instance.info()
    }

    fn provided_features(&self) -> &[Feature] {
        &self.features
    }

    fn build(&self, _dependencies: &Resolved, _args: Args) -> Result<Instance, DynError> {
        Ok(self.instance.clone())
    }

    fn describe(&self) -> String {
        format!("instance of {}", self.instance.info())
    }
}
