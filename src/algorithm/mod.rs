//! Scoring Algorithms
//!
//! The interface the conformal predictors consume from the underlying machine
//! learning models, and reference k-nearest-neighbour implementations.
//!
//! Only training, scoring, cloning and a flat string-keyed parameter map are
//! required. Any model implementing [`Classifier`] or [`Regressor`] can back
//! the nonconformity measures in [`crate::ncm`].
mod knn;

pub use knn::{KnnClassifier, KnnRegressor};

use crate::data::{ClassLabel, FeatureVector, Record};
use crate::errors::ConformalError;
use std::collections::BTreeMap;

/// Flat parameter map used for configuration and grid-search substitution.
pub type Params = BTreeMap<String, String>;

/// Common part of every scoring algorithm.
pub trait Algorithm: Send + Sync {
    /// Name the algorithm is registered under.
    fn name(&self) -> &'static str;

    /// Current parameter values.
    fn params(&self) -> Params;

    /// Set a single parameter from its string representation.
    ///
    /// Unknown names return [`ConformalError::UnknownParameter`], values that do not
    /// parse or are out of range return [`ConformalError::InvalidParameter`].
    fn set_param(&mut self, name: &str, value: &str) -> Result<(), ConformalError>;

    /// Whether `fit` has completed successfully.
    fn is_fitted(&self) -> bool;

    /// Serialized trained state, restored with [`Algorithm::restore`].
    fn state(&self) -> Result<Vec<u8>, ConformalError>;

    /// Restore a trained state produced by [`Algorithm::state`].
    fn restore(&mut self, state: &[u8]) -> Result<(), ConformalError>;

    /// Set several parameters, stopping at the first failure.
    fn set_params(&mut self, params: &Params) -> Result<(), ConformalError> {
        for (name, value) in params {
            self.set_param(name, value)?;
        }
        Ok(())
    }
}

/// A trainable classifier.
pub trait Classifier: Algorithm {
    /// Train on `records`. Fails when the records hold fewer than two classes.
    fn fit(&mut self, records: &[Record]) -> Result<(), ConformalError>;

    /// Decision score per known class, larger means more likely.
    fn decision_scores(&self, features: &FeatureVector) -> Result<BTreeMap<ClassLabel, f64>, ConformalError>;

    /// Whether [`Classifier::probabilities`] is available.
    fn supports_probabilities(&self) -> bool {
        false
    }

    /// Class membership probabilities, summing to one.
    fn probabilities(&self, _features: &FeatureVector) -> Result<BTreeMap<ClassLabel, f64>, ConformalError> {
        Err(ConformalError::Unsupported(format!(
            "{} does not produce probabilities",
            self.name()
        )))
    }

    fn clone_box(&self) -> Box<dyn Classifier>;
}

/// A trainable regressor.
pub trait Regressor: Algorithm {
    fn fit(&mut self, records: &[Record]) -> Result<(), ConformalError>;

    fn predict(&self, features: &FeatureVector) -> Result<f64, ConformalError>;

    fn clone_box(&self) -> Box<dyn Regressor>;
}

impl Clone for Box<dyn Classifier> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl Clone for Box<dyn Regressor> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl std::fmt::Debug for dyn Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:?})", self.name(), self.params())
    }
}

impl std::fmt::Debug for dyn Regressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:?})", self.name(), self.params())
    }
}
