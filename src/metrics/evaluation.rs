use crate::data::Task;
use crate::errors::ConformalError;
use crate::metrics::{classification, probabilistic, regression};
use crate::predictor::{Prediction, PredictorKind};
use crate::utils::items_to_strings;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A test record's true label and what the predictor said about it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Observation {
    pub label: f64,
    pub prediction: Prediction,
}

pub type MetricFn = fn(&[Observation], f64) -> Result<f64, ConformalError>;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Share of test labels inside the predicted region.
    Coverage,
    /// Share of test labels outside the predicted region.
    ErrorRate,
    ObservedFuzziness,
    AverageSetSize,
    SingleLabelFraction,
    MeanIntervalWidth,
    MedianIntervalWidth,
    RootMeanSquaredError,
    LogLoss,
    BrierScore,
}

const METRIC_NAMES: [&str; 10] = [
    "Coverage",
    "ErrorRate",
    "ObservedFuzziness",
    "AverageSetSize",
    "SingleLabelFraction",
    "MeanIntervalWidth",
    "MedianIntervalWidth",
    "RootMeanSquaredError",
    "LogLoss",
    "BrierScore",
];

impl FromStr for Metric {
    type Err = ConformalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Coverage" => Ok(Metric::Coverage),
            "ErrorRate" => Ok(Metric::ErrorRate),
            "ObservedFuzziness" => Ok(Metric::ObservedFuzziness),
            "AverageSetSize" => Ok(Metric::AverageSetSize),
            "SingleLabelFraction" => Ok(Metric::SingleLabelFraction),
            "MeanIntervalWidth" => Ok(Metric::MeanIntervalWidth),
            "MedianIntervalWidth" => Ok(Metric::MedianIntervalWidth),
            "RootMeanSquaredError" => Ok(Metric::RootMeanSquaredError),
            "LogLoss" => Ok(Metric::LogLoss),
            "BrierScore" => Ok(Metric::BrierScore),
            _ => Err(ConformalError::ParseString(
                s.to_string(),
                "Metric".to_string(),
                items_to_strings(METRIC_NAMES.to_vec()),
            )),
        }
    }
}

impl Metric {
    pub fn maximize(&self) -> bool {
        metric_callables(self).1
    }

    /// Compute the metric over `observations` at `confidence`.
    pub fn calculate(&self, observations: &[Observation], confidence: f64) -> Result<f64, ConformalError> {
        if observations.is_empty() {
            return Err(ConformalError::EvaluationFailure(format!(
                "no observations to compute {:?} from",
                self
            )));
        }
        (metric_callables(self).0)(observations, confidence)
    }

    /// Metric optimised when none is configured.
    pub fn default_for(kind: PredictorKind, task: Task) -> Metric {
        match (kind, task) {
            (PredictorKind::Vap, _) => Metric::LogLoss,
            (_, Task::Classification) => Metric::ObservedFuzziness,
            (_, Task::Regression) => Metric::MeanIntervalWidth,
        }
    }
}

pub fn metric_callables(metric_type: &Metric) -> (MetricFn, bool) {
    match metric_type {
        Metric::Coverage => (CoverageMetric::calculate_metric, CoverageMetric::maximize()),
        Metric::ErrorRate => (ErrorRateMetric::calculate_metric, ErrorRateMetric::maximize()),
        Metric::ObservedFuzziness => (
            classification::ObservedFuzzinessMetric::calculate_metric,
            classification::ObservedFuzzinessMetric::maximize(),
        ),
        Metric::AverageSetSize => (
            classification::AverageSetSizeMetric::calculate_metric,
            classification::AverageSetSizeMetric::maximize(),
        ),
        Metric::SingleLabelFraction => (
            classification::SingleLabelFractionMetric::calculate_metric,
            classification::SingleLabelFractionMetric::maximize(),
        ),
        Metric::MeanIntervalWidth => (
            regression::MeanIntervalWidthMetric::calculate_metric,
            regression::MeanIntervalWidthMetric::maximize(),
        ),
        Metric::MedianIntervalWidth => (
            regression::MedianIntervalWidthMetric::calculate_metric,
            regression::MedianIntervalWidthMetric::maximize(),
        ),
        Metric::RootMeanSquaredError => (
            regression::RootMeanSquaredErrorMetric::calculate_metric,
            regression::RootMeanSquaredErrorMetric::maximize(),
        ),
        Metric::LogLoss => (
            probabilistic::LogLossMetric::calculate_metric,
            probabilistic::LogLossMetric::maximize(),
        ),
        Metric::BrierScore => (
            probabilistic::BrierScoreMetric::calculate_metric,
            probabilistic::BrierScoreMetric::maximize(),
        ),
    }
}

pub trait EvaluationMetric {
    fn calculate_metric(observations: &[Observation], confidence: f64) -> Result<f64, ConformalError>;
    fn maximize() -> bool;
}

/// Observed coverage, `None` when the predictions carry no region.
pub fn coverage(observations: &[Observation], confidence: f64) -> Result<Option<f64>, ConformalError> {
    let mut covered = 0usize;
    for o in observations {
        match o.prediction.covers(o.label, confidence)? {
            Some(true) => covered += 1,
            Some(false) => (),
            None => return Ok(None),
        }
    }
    Ok(Some(covered as f64 / observations.len() as f64))
}

fn region_coverage(observations: &[Observation], confidence: f64) -> Result<f64, ConformalError> {
    coverage(observations, confidence)?.ok_or_else(|| {
        ConformalError::EvaluationFailure("coverage needs p-values or prediction intervals".to_string())
    })
}

pub struct CoverageMetric {}
impl EvaluationMetric for CoverageMetric {
    fn calculate_metric(observations: &[Observation], confidence: f64) -> Result<f64, ConformalError> {
        region_coverage(observations, confidence)
    }
    fn maximize() -> bool {
        true
    }
}

pub struct ErrorRateMetric {}
impl EvaluationMetric for ErrorRateMetric {
    fn calculate_metric(observations: &[Observation], confidence: f64) -> Result<f64, ConformalError> {
        Ok(1.0 - region_coverage(observations, confidence)?)
    }
    fn maximize() -> bool {
        false
    }
}
