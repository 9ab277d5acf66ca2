//! Prediction results returned by the conformal predictors.
use crate::data::{class_of, ClassLabel};
use crate::errors::ConformalError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// p-value of every candidate label.
pub type PValues = BTreeMap<ClassLabel, f64>;

/// Labels whose p-value exceeds the significance level `1 - confidence`.
pub fn prediction_set(p_values: &PValues, confidence: f64) -> Vec<ClassLabel> {
    let significance = 1.0 - confidence;
    p_values
        .iter()
        .filter(|(_, p)| **p > significance)
        .map(|(l, _)| *l)
        .collect()
}

/// Largest p-value, how well the best-fitting label conforms.
pub fn credibility(p_values: &PValues) -> f64 {
    p_values.values().copied().fold(0.0, f64::max)
}

/// One minus the second largest p-value, the largest confidence at which the
/// prediction set holds at most one label.
pub fn confidence(p_values: &PValues) -> f64 {
    let mut sorted: Vec<f64> = p_values.values().copied().collect();
    sorted.sort_unstable_by(|a, b| b.total_cmp(a));
    1.0 - sorted.get(1).copied().unwrap_or(0.0)
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub fn new(lower: f64, upper: f64) -> Self {
        Interval { lower, upper }
    }

    /// The whole real line.
    pub fn unbounded() -> Self {
        Interval::new(f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, y: f64) -> bool {
        self.lower <= y && y <= self.upper
    }

    /// Clamp both bounds into `[min, max]`. A NaN limit leaves that side uncapped.
    pub fn capped(&self, min: f64, max: f64) -> Interval {
        Interval::new(self.lower.max(min).min(max), self.upper.max(min).min(max))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ConfidenceInterval {
    pub confidence: f64,
    pub interval: Interval,
    /// `interval` clamped to the range of labels seen in training.
    pub capped: Interval,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RegressionPrediction {
    /// Point prediction of the scoring model.
    pub point: f64,
    /// One interval per requested confidence, in the order requested.
    pub intervals: Vec<ConfidenceInterval>,
}

impl RegressionPrediction {
    pub fn at(&self, confidence: f64) -> Option<&ConfidenceInterval> {
        self.intervals.iter().find(|ci| ci.confidence == confidence)
    }
}

/// Venn-ABERS output for a binary problem.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProbabilityPrediction {
    /// Merged probability of each class.
    pub probabilities: BTreeMap<ClassLabel, f64>,
    /// Mean of the member lower probabilities of the positive class.
    pub lower: f64,
    /// Mean of the member upper probabilities of the positive class.
    pub upper: f64,
}

/// Output of any predictor, one variant per kind of region.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Prediction {
    PValues(PValues),
    Interval(RegressionPrediction),
    Probabilities(ProbabilityPrediction),
}

impl Prediction {
    /// Whether the true `label` falls inside the region at `confidence`.
    ///
    /// Probability predictions carry no region and return `None`.
    pub fn covers(&self, label: f64, confidence: f64) -> Result<Option<bool>, ConformalError> {
        match self {
            Prediction::PValues(p) => {
                let class = class_of(label)?;
                Ok(Some(p.get(&class).map_or(false, |v| *v > 1.0 - confidence)))
            }
            Prediction::Interval(r) => Ok(r.at(confidence).map(|ci| ci.interval.contains(label))),
            Prediction::Probabilities(_) => Ok(None),
        }
    }
}
