//! Conformal Predictors
//!
//! Inductive, aggregated, transductive and Venn-ABERS predictors behind one
//! [`Predictor`] sum type.
//!
//! # Submodules
//!
//! * `icp`: A single measure calibrated on one held-out calibration set.
//! * `acp`: Several ICPs over different calibration splits, median aggregated.
//! * `tcp`: Classification by refitting once per candidate label.
//! * `vap`: Binary probability intervals with Venn-ABERS calibration.
//! * `result`: p-values, intervals and probability outputs.

pub mod acp;
pub mod icp;
pub mod result;
pub mod tcp;
pub mod vap;

pub use acp::Acp;
pub use icp::{Icp, IcpCalibration};
pub use result::{ConfidenceInterval, Interval, PValues, Prediction, ProbabilityPrediction, RegressionPrediction};
pub use tcp::Tcp;
pub use vap::{BinaryLabels, Vap, VapMember};

use crate::algorithm::{Algorithm, Params};
use crate::data::{Dataset, FeatureVector, Task};
use crate::errors::ConformalError;
use crate::ncm::Ncm;
use crate::sampler::SamplingStrategy;
use crate::utils::items_to_strings;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredictorKind {
    Acp,
    Tcp,
    Vap,
}

impl FromStr for PredictorKind {
    type Err = ConformalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Acp" | "ACP" => Ok(PredictorKind::Acp),
            "Tcp" | "TCP" => Ok(PredictorKind::Tcp),
            "Vap" | "VAP" => Ok(PredictorKind::Vap),
            _ => Err(ConformalError::ParseString(
                s.to_string(),
                "PredictorKind".to_string(),
                items_to_strings(vec!["Acp", "Tcp", "Vap"]),
            )),
        }
    }
}

/// Any conformal or Venn predictor.
#[derive(Clone, Debug)]
pub enum Predictor {
    Acp(Acp),
    Tcp(Tcp),
    Vap(Vap),
}

impl Predictor {
    /// An inductive conformal predictor, i.e. a one-member aggregated predictor
    /// holding out `calibration_ratio` of the records.
    pub fn icp(ncm: Ncm, calibration_ratio: f64, seed: u64) -> Result<Self, ConformalError> {
        let strategy = SamplingStrategy::Random {
            num_samples: 1,
            calibration_ratio,
            stratified: false,
        };
        Ok(Predictor::Acp(Acp::new(ncm, strategy, seed)?))
    }

    pub fn kind(&self) -> PredictorKind {
        match self {
            Predictor::Acp(_) => PredictorKind::Acp,
            Predictor::Tcp(_) => PredictorKind::Tcp,
            Predictor::Vap(_) => PredictorKind::Vap,
        }
    }

    pub fn task(&self) -> Task {
        match self {
            Predictor::Acp(acp) => acp.ncm().task(),
            Predictor::Tcp(_) | Predictor::Vap(_) => Task::Classification,
        }
    }

    pub fn is_trained(&self) -> bool {
        match self {
            Predictor::Acp(p) => p.is_trained(),
            Predictor::Tcp(p) => p.is_trained(),
            Predictor::Vap(p) => p.is_trained(),
        }
    }

    pub fn train(&mut self, data: &Dataset) -> Result<(), ConformalError> {
        match self {
            Predictor::Acp(p) => p.train(data),
            Predictor::Tcp(p) => p.train(data),
            Predictor::Vap(p) => p.train(data),
        }
    }

    /// Parameters of the underlying measure or model.
    pub fn params(&self) -> Params {
        match self {
            Predictor::Acp(p) => p.ncm().params(),
            Predictor::Tcp(p) => p.ncm().params(),
            Predictor::Vap(p) => p.model().params(),
        }
    }

    /// Set one parameter of the underlying measure or model. Only allowed
    /// before training.
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<(), ConformalError> {
        if self.is_trained() {
            return Err(ConformalError::AlreadyTrained(format!(
                "{:?} predictor, parameters cannot change",
                self.kind()
            )));
        }
        match self {
            Predictor::Acp(p) => p.ncm_mut().set_param(name, value),
            Predictor::Tcp(p) => p.ncm_mut().set_param(name, value),
            Predictor::Vap(p) => p.model_mut().set_param(name, value),
        }
    }

    pub fn set_params(&mut self, params: &Params) -> Result<(), ConformalError> {
        for (name, value) in params {
            self.set_param(name, value)?;
        }
        Ok(())
    }

    /// Predict one record. Regression predictions hold one interval per
    /// entry of `confidences`; the other outputs do not depend on it.
    pub fn predict(&self, features: &FeatureVector, confidences: &[f64]) -> Result<Prediction, ConformalError> {
        match self {
            Predictor::Acp(p) => match p.ncm().task() {
                Task::Classification => Ok(Prediction::PValues(p.predict_p_values(features)?)),
                Task::Regression => Ok(Prediction::Interval(p.predict_intervals(features, confidences)?)),
            },
            Predictor::Tcp(p) => Ok(Prediction::PValues(p.predict_p_values(features)?)),
            Predictor::Vap(p) => Ok(Prediction::Probabilities(p.predict_probabilities(features)?)),
        }
    }

    /// Confidence of the interval `point ± half_width`, regression only.
    pub fn predict_confidence(&self, features: &FeatureVector, half_width: f64) -> Result<f64, ConformalError> {
        match self {
            Predictor::Acp(p) if p.ncm().task() == Task::Regression => p.predict_confidence(features, half_width),
            _ => Err(ConformalError::Unsupported(format!(
                "confidence prediction with a {:?} {:?} predictor",
                self.task(),
                self.kind()
            ))),
        }
    }

    /// Merge the members of `other` into this predictor.
    pub fn merge(&mut self, other: Predictor) -> Result<(), ConformalError> {
        match (self, other) {
            (Predictor::Acp(a), Predictor::Acp(b)) => a.merge(b),
            (Predictor::Vap(a), Predictor::Vap(b)) => a.merge(b),
            (Predictor::Tcp(_), Predictor::Tcp(_)) => Err(ConformalError::AggregationMismatch(
                "transductive predictors have no members to merge".to_string(),
            )),
            (a, b) => Err(ConformalError::AggregationMismatch(format!(
                "cannot merge a {:?} predictor into a {:?} predictor",
                b.kind(),
                a.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests;
