//! Nonconformity Measures
//!
//! A nonconformity measure turns a trained scoring model and a (record, label)
//! pair into a single number, lower meaning more conforming.
//!
//! # Submodules
//!
//! * `classification`: Mondrian measures computed per candidate class.
//! * `regression`: Absolute and normalized residual measures, invertible into intervals.

pub mod classification;
pub mod regression;

pub use classification::{ClassificationNcm, ClassificationNcmKind};
pub use regression::{RegressionNcm, RegressionNcmKind};

use crate::algorithm::{Algorithm, Params};
use crate::data::{Record, Task};
use crate::errors::ConformalError;
use crate::registry::Registry;
use serde::{Deserialize, Serialize};

/// Which measure is used.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum NcmKind {
    Classification(ClassificationNcmKind),
    Regression(RegressionNcmKind),
}

impl NcmKind {
    pub fn task(&self) -> Task {
        match self {
            NcmKind::Classification(_) => Task::Classification,
            NcmKind::Regression(_) => Task::Regression,
        }
    }
}

/// Everything needed to rebuild an untrained measure through a [`Registry`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NcmDescriptor {
    pub kind: NcmKind,
    pub algorithm: String,
    #[serde(default)]
    pub algorithm_params: Params,
    #[serde(default)]
    pub error_algorithm: Option<String>,
    #[serde(default)]
    pub error_algorithm_params: Params,
}

impl NcmDescriptor {
    /// Build the untrained measure described here.
    pub fn build(&self, registry: &Registry) -> Result<Ncm, ConformalError> {
        match self.kind {
            NcmKind::Classification(kind) => {
                let mut model = registry.classifier(&self.algorithm)?;
                model.set_params(&self.algorithm_params)?;
                Ok(Ncm::Classification(ClassificationNcm::new(kind, model)?))
            }
            NcmKind::Regression(kind) => {
                let mut model = registry.regressor(&self.algorithm)?;
                model.set_params(&self.algorithm_params)?;
                let error_model = match &self.error_algorithm {
                    Some(name) => {
                        let mut err = registry.regressor(name)?;
                        err.set_params(&self.error_algorithm_params)?;
                        Some(err)
                    }
                    None => None,
                };
                Ok(Ncm::Regression(RegressionNcm::new(kind, model, error_model)?))
            }
        }
    }
}

/// A classification or regression nonconformity measure.
#[derive(Clone, Debug)]
pub enum Ncm {
    Classification(ClassificationNcm),
    Regression(RegressionNcm),
}

impl Ncm {
    pub fn task(&self) -> Task {
        match self {
            Ncm::Classification(_) => Task::Classification,
            Ncm::Regression(_) => Task::Regression,
        }
    }

    pub fn requires_error_model(&self) -> bool {
        match self {
            Ncm::Classification(_) => false,
            Ncm::Regression(ncm) => ncm.requires_error_model(),
        }
    }

    pub fn fit(&mut self, records: &[Record]) -> Result<(), ConformalError> {
        match self {
            Ncm::Classification(ncm) => ncm.fit(records),
            Ncm::Regression(ncm) => ncm.fit(records),
        }
    }

    pub fn is_fitted(&self) -> bool {
        match self {
            Ncm::Classification(ncm) => ncm.is_fitted(),
            Ncm::Regression(ncm) => ncm.is_fitted(),
        }
    }

    pub fn params(&self) -> Params {
        match self {
            Ncm::Classification(ncm) => ncm.params(),
            Ncm::Regression(ncm) => ncm.params(),
        }
    }

    pub fn set_param(&mut self, name: &str, value: &str) -> Result<(), ConformalError> {
        match self {
            Ncm::Classification(ncm) => ncm.set_param(name, value),
            Ncm::Regression(ncm) => ncm.set_param(name, value),
        }
    }

    pub fn describe(&self) -> NcmDescriptor {
        match self {
            Ncm::Classification(ncm) => NcmDescriptor {
                kind: NcmKind::Classification(ncm.kind()),
                algorithm: ncm.model().name().to_string(),
                algorithm_params: ncm.model().params(),
                error_algorithm: None,
                error_algorithm_params: Params::new(),
            },
            Ncm::Regression(ncm) => NcmDescriptor {
                kind: NcmKind::Regression(ncm.kind()),
                algorithm: ncm.model().name().to_string(),
                algorithm_params: ncm.model().params(),
                error_algorithm: ncm.error_model().map(|e| e.name().to_string()),
                error_algorithm_params: ncm.error_model().map(|e| e.params()).unwrap_or_default(),
            },
        }
    }

    /// Serialized state of the trained model and, when present, the error model.
    pub fn model_states(&self) -> Result<(Vec<u8>, Option<Vec<u8>>), ConformalError> {
        match self {
            Ncm::Classification(ncm) => Ok((ncm.model().state()?, None)),
            Ncm::Regression(ncm) => {
                let error = match ncm.error_model() {
                    Some(err) => Some(err.state()?),
                    None => None,
                };
                Ok((ncm.model().state()?, error))
            }
        }
    }

    /// Restore trained models saved with [`Ncm::model_states`].
    pub fn restore_models(&mut self, model: &[u8], error_model: Option<&[u8]>) -> Result<(), ConformalError> {
        match self {
            Ncm::Classification(ncm) => ncm.model_mut().restore(model),
            Ncm::Regression(ncm) => {
                ncm.model_mut().restore(model)?;
                match (ncm.error_model_mut(), error_model) {
                    (Some(err), Some(state)) => err.restore(state),
                    (None, None) => Ok(()),
                    _ => Err(ConformalError::UnableToRead(
                        "error model state does not match the nonconformity measure".to_string(),
                    )),
                }
            }
        }
    }
}
