//! Predictor Configuration
//!
//! JSON description of an untrained predictor, turned into a [`Predictor`]
//! with the algorithms of a [`Registry`].
use crate::algorithm::{Algorithm, KnnClassifier, Params};
use crate::errors::ConformalError;
use crate::ncm::{ClassificationNcmKind, NcmDescriptor, NcmKind};
use crate::predictor::{Acp, Predictor, PredictorKind, Tcp, Vap};
use crate::registry::Registry;
use crate::sampler::SamplingStrategy;
use log::debug;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_kind() -> PredictorKind {
    PredictorKind::Acp
}
fn default_ncm() -> NcmDescriptor {
    NcmDescriptor {
        kind: NcmKind::Classification(ClassificationNcmKind::Margin),
        algorithm: KnnClassifier::NAME.to_string(),
        algorithm_params: Params::new(),
        error_algorithm: None,
        error_algorithm_params: Params::new(),
    }
}
fn default_mondrian() -> bool {
    true
}

/// Configuration of an untrained predictor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Which predictor to build.
    #[serde(default = "default_kind")]
    pub kind: PredictorKind,
    /// Nonconformity measure and its algorithms. A Venn-ABERS predictor only
    /// uses `algorithm` and `algorithm_params`, as its classifier.
    #[serde(default = "default_ncm")]
    pub ncm: NcmDescriptor,
    /// Calibration sampling of aggregated and Venn-ABERS predictors.
    #[serde(default)]
    pub strategy: SamplingStrategy,
    /// Seed for the calibration sampling.
    #[serde(default)]
    pub seed: u64,
    /// Compare transductive scores within the candidate class only.
    #[serde(default = "default_mondrian")]
    pub mondrian: bool,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        PredictorConfig {
            kind: PredictorKind::Acp,
            ncm: default_ncm(),
            strategy: SamplingStrategy::default(),
            seed: 0,
            mondrian: true,
        }
    }
}

impl PredictorConfig {
    /// Instantiate the configured, untrained predictor.
    pub fn build(&self, registry: &Registry) -> Result<Predictor, ConformalError> {
        debug!("Building {:?} predictor from configuration.", self.kind);
        match self.kind {
            PredictorKind::Acp => Ok(Predictor::Acp(Acp::new(
                self.ncm.build(registry)?,
                self.strategy.clone(),
                self.seed,
            )?)),
            PredictorKind::Tcp => Ok(Predictor::Tcp(
                Tcp::new(self.ncm.build(registry)?)?.with_mondrian(self.mondrian),
            )),
            PredictorKind::Vap => {
                let mut model = registry.classifier(&self.ncm.algorithm)?;
                model.set_params(&self.ncm.algorithm_params)?;
                Ok(Predictor::Vap(Vap::new(model, self.strategy.clone(), self.seed)?))
            }
        }
    }
}

/// JSON file round-trips for configuration structs.
pub trait ConfigIO: Serialize + DeserializeOwned + Sized {
    /// Save as a json object to a file.
    ///
    /// * `path` - Path to save the configuration.
    fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConformalError> {
        fs::write(path, self.json_dump()?).map_err(|e| ConformalError::UnableToWrite(e.to_string()))
    }

    fn json_dump(&self) -> Result<String, ConformalError> {
        serde_json::to_string_pretty(self).map_err(|e| ConformalError::UnableToWrite(e.to_string()))
    }

    fn from_json(json_str: &str) -> Result<Self, ConformalError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| ConformalError::UnableToRead(e.to_string()))
    }

    /// Load from a path to a json object.
    ///
    /// * `path` - Path to load the configuration from.
    fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConformalError> {
        let json_str = fs::read_to_string(path).map_err(|e| ConformalError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl ConfigIO for PredictorConfig {}
