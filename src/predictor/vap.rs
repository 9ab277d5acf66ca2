//! Venn-ABERS predictor for binary classification.
//!
//! Each member calibrates the classifier score with two isotonic regressions,
//! one per hypothetical label of the test record, giving a lower and an upper
//! probability of the positive class.
use crate::algorithm::{Algorithm, Classifier};
use crate::calibration::IsotonicCalibrator;
use crate::data::{ClassLabel, Dataset, FeatureVector, Task};
use crate::errors::ConformalError;
use crate::predictor::acp::check_compatible;
use crate::predictor::result::ProbabilityPrediction;
use crate::sampler::SamplingStrategy;
use crate::utils::geometric_mean;
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Negative and positive class, the positive one being the larger label.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BinaryLabels {
    pub negative: ClassLabel,
    pub positive: ClassLabel,
}

/// One trained classifier and its calibration pairs `(score, is_positive)`,
/// sorted by score.
#[derive(Clone, Debug)]
pub struct VapMember {
    pub(crate) model: Box<dyn Classifier>,
    pub(crate) calibration: Vec<(f64, bool)>,
}

fn positive_score(
    model: &dyn Classifier,
    features: &FeatureVector,
    labels: BinaryLabels,
) -> Result<f64, ConformalError> {
    let scores = model.decision_scores(features)?;
    let of = |l: ClassLabel| scores.get(&l).copied().unwrap_or(0.0);
    let s = of(labels.positive) - of(labels.negative);
    if s.is_nan() {
        return Err(ConformalError::InvalidInput("classifier produced a NaN score".to_string()));
    }
    Ok(s)
}

impl VapMember {
    /// Lower and upper probability `(p0, p1)` of the positive class.
    pub fn interval(&self, features: &FeatureVector, labels: BinaryLabels) -> Result<(f64, f64), ConformalError> {
        let s = positive_score(self.model.as_ref(), features, labels)?;
        let mut x: Vec<f64> = self.calibration.iter().map(|(score, _)| *score).collect();
        let mut y: Vec<f64> = self.calibration.iter().map(|(_, pos)| if *pos { 1.0 } else { 0.0 }).collect();
        x.push(s);
        y.push(0.0);
        let p0 = IsotonicCalibrator::fit(&x, &y).value_at(s);
        if let Some(last) = y.last_mut() {
            *last = 1.0;
        }
        let p1 = IsotonicCalibrator::fit(&x, &y).value_at(s);
        Ok((p0, p1))
    }
}

#[derive(Clone, Debug)]
pub struct Vap {
    pub(crate) template: Box<dyn Classifier>,
    pub(crate) strategy: SamplingStrategy,
    pub(crate) seed: u64,
    pub(crate) members: BTreeMap<usize, VapMember>,
    pub(crate) labels: Option<BinaryLabels>,
}

impl Vap {
    pub fn new(model: Box<dyn Classifier>, strategy: SamplingStrategy, seed: u64) -> Result<Self, ConformalError> {
        strategy.validate()?;
        Ok(Vap {
            template: model,
            strategy,
            seed,
            members: BTreeMap::new(),
            labels: None,
        })
    }

    pub fn model(&self) -> &dyn Classifier {
        self.template.as_ref()
    }

    pub fn model_mut(&mut self) -> &mut dyn Classifier {
        self.template.as_mut()
    }

    pub fn strategy(&self) -> &SamplingStrategy {
        &self.strategy
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn labels(&self) -> Option<BinaryLabels> {
        self.labels
    }

    pub fn num_members(&self) -> usize {
        self.strategy.num_splits()
    }

    pub fn members(&self) -> &BTreeMap<usize, VapMember> {
        &self.members
    }

    pub fn is_trained(&self) -> bool {
        !self.members.is_empty()
    }

    pub fn is_fully_trained(&self) -> bool {
        self.members.len() == self.num_members()
    }

    pub fn train(&mut self, data: &Dataset) -> Result<(), ConformalError> {
        let all: Vec<usize> = (0..self.num_members()).collect();
        self.train_members(data, &all)
    }

    /// Train the members in `indices` on the splits drawn for them.
    pub fn train_members(&mut self, data: &Dataset, indices: &[usize]) -> Result<(), ConformalError> {
        let found: Vec<ClassLabel> = data.class_labels()?.into_iter().collect();
        let labels = match found.as_slice() {
            [negative, positive] => BinaryLabels {
                negative: *negative,
                positive: *positive,
            },
            _ => {
                return Err(ConformalError::InvalidInput(format!(
                    "Venn-ABERS prediction needs exactly two classes, found {}",
                    found.len()
                )))
            }
        };
        if self.labels.map_or(false, |l| l != labels) {
            return Err(ConformalError::InvalidInput(format!(
                "classes {:?} differ from the classes {:?} already trained on",
                labels, self.labels
            )));
        }
        for (pos, i) in indices.iter().enumerate() {
            if *i >= self.num_members() {
                return Err(ConformalError::InvalidInput(format!(
                    "member index {} out of range for {} members",
                    i,
                    self.num_members()
                )));
            }
            if self.members.contains_key(i) || indices[..pos].contains(i) {
                return Err(ConformalError::AlreadyTrained(format!("Venn-ABERS member {}", i)));
            }
        }

        let trained: Vec<(usize, VapMember)> = indices
            .par_iter()
            .map(|i| {
                let split = self.strategy.split(data, self.seed, *i, Task::Classification)?;
                let mut model = self.template.clone();
                model.fit(&split.proper_training)?;
                let mut calibration = split
                    .calibration
                    .iter()
                    .map(|r| Ok((positive_score(model.as_ref(), &r.features, labels)?, r.class()? == labels.positive)))
                    .collect::<Result<Vec<_>, ConformalError>>()?;
                calibration.sort_by(|a, b| a.0.total_cmp(&b.0));
                Ok((*i, VapMember { model, calibration }))
            })
            .collect::<Result<_, ConformalError>>()?;
        self.labels = Some(labels);
        self.members.extend(trained);
        info!(
            "Trained {} of {} Venn-ABERS members.",
            self.members.len(),
            self.num_members()
        );
        Ok(())
    }

    /// Combine the members of `other`, which must share seed, strategy, model and classes.
    pub fn merge(&mut self, other: Vap) -> Result<(), ConformalError> {
        let describe = |m: &dyn Classifier| (m.name(), m.params());
        check_compatible(
            (&self.strategy, self.seed, &describe(self.template.as_ref())),
            (&other.strategy, other.seed, &describe(other.template.as_ref())),
        )?;
        if let (Some(a), Some(b)) = (self.labels, other.labels) {
            if a != b {
                return Err(ConformalError::AggregationMismatch(format!(
                    "classes differ: {:?} and {:?}",
                    a, b
                )));
            }
        }
        if let Some(i) = other.members.keys().find(|i| self.members.contains_key(*i)) {
            return Err(ConformalError::AggregationMismatch(format!(
                "member {} is trained in both predictors",
                i
            )));
        }
        self.labels = self.labels.or(other.labels);
        self.members.extend(other.members);
        Ok(())
    }

    /// Merged probability of each class with the mean member interval.
    pub fn predict_probabilities(&self, features: &FeatureVector) -> Result<ProbabilityPrediction, ConformalError> {
        let labels = match self.labels {
            Some(l) if !self.members.is_empty() => l,
            _ => return Err(ConformalError::UntrainedPredictor("Venn-ABERS predictor".to_string())),
        };
        let intervals: Vec<(f64, f64)> = self
            .members
            .values()
            .map(|m| m.interval(features, labels))
            .collect::<Result<_, ConformalError>>()?;
        let n = intervals.len() as f64;
        let p0: Vec<f64> = intervals.iter().map(|(p0, _)| *p0).collect();
        let p1: Vec<f64> = intervals.iter().map(|(_, p1)| *p1).collect();
        let lower = p0.iter().sum::<f64>() / n;
        let upper = p1.iter().sum::<f64>() / n;

        let gm_p1 = geometric_mean(&p1);
        let gm_not_p0 = geometric_mean(&p0.iter().map(|p| 1.0 - p).collect::<Vec<_>>());
        // Both means vanish only when the members disagree completely.
        let p = if gm_p1 + gm_not_p0 > 0.0 {
            gm_p1 / (gm_not_p0 + gm_p1)
        } else {
            (lower + upper) / 2.0
        };

        let mut probabilities = BTreeMap::new();
        probabilities.insert(labels.negative, 1.0 - p);
        probabilities.insert(labels.positive, p);
        Ok(ProbabilityPrediction {
            probabilities,
            lower,
            upper,
        })
    }
}
