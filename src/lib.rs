//! Conformal prediction on top of arbitrary scoring algorithms.
//!
//! Nonconformity measures wrap a [`algorithm::Classifier`] or
//! [`algorithm::Regressor`] and are calibrated into aggregated (and inductive),
//! transductive or Venn-ABERS predictors. Trained predictors can be evaluated,
//! grid-searched, saved to checksummed bundles and merged.
#[cfg(test)]
mod testing;

// Modules
pub mod algorithm;
pub mod calibration;
pub mod config;
pub mod constants;
pub mod data;
pub mod errors;
pub mod metrics;
pub mod ncm;
pub mod persist;
pub mod predictor;
pub mod registry;
pub mod sampler;
pub mod tune;
pub mod utils;

// Individual classes, and functions
pub use config::{ConfigIO, PredictorConfig};
pub use data::{Dataset, FeatureVector, Record, Task};
pub use errors::ConformalError;
pub use ncm::Ncm;
pub use persist::{load, merge, save, ModelBundle};
pub use predictor::{Prediction, Predictor};
pub use registry::Registry;
pub use tune::{GridSearch, ParameterGrid, TestingStrategy};
