//! Registry
//!
//! Explicit name to factory mapping for scoring algorithms, used when building
//! predictors from configuration and when loading saved models.
use crate::algorithm::{Classifier, KnnClassifier, KnnRegressor, Regressor};
use crate::errors::ConformalError;
use hashbrown::HashMap;

pub type ClassifierFactory = fn() -> Box<dyn Classifier>;
pub type RegressorFactory = fn() -> Box<dyn Regressor>;

#[derive(Clone, Default)]
pub struct Registry {
    classifiers: HashMap<String, ClassifierFactory>,
    regressors: HashMap<String, RegressorFactory>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Registry::default()
    }

    /// A registry holding the algorithms shipped with this crate.
    pub fn with_defaults() -> Self {
        let mut registry = Registry::new();
        registry.register_classifier(KnnClassifier::NAME, || Box::new(KnnClassifier::default()));
        registry.register_regressor(KnnRegressor::NAME, || Box::new(KnnRegressor::default()));
        registry
    }

    /// Register a classifier factory, replacing any previous one with the same name.
    pub fn register_classifier(&mut self, name: &str, factory: ClassifierFactory) {
        self.classifiers.insert(name.to_string(), factory);
    }

    pub fn register_regressor(&mut self, name: &str, factory: RegressorFactory) {
        self.regressors.insert(name.to_string(), factory);
    }

    /// A fresh, untrained classifier registered under `name`.
    pub fn classifier(&self, name: &str) -> Result<Box<dyn Classifier>, ConformalError> {
        self.classifiers
            .get(name)
            .map(|f| f())
            .ok_or_else(|| ConformalError::ParseString(name.to_string(), "Classifier".to_string(), self.names(true)))
    }

    pub fn regressor(&self, name: &str) -> Result<Box<dyn Regressor>, ConformalError> {
        self.regressors
            .get(name)
            .map(|f| f())
            .ok_or_else(|| ConformalError::ParseString(name.to_string(), "Regressor".to_string(), self.names(false)))
    }

    fn names(&self, classifiers: bool) -> String {
        let mut names: Vec<&str> = if classifiers {
            self.classifiers.keys().map(|s| s.as_str()).collect()
        } else {
            self.regressors.keys().map(|s| s.as_str()).collect()
        };
        names.sort_unstable();
        crate::utils::items_to_strings(names)
    }
}
