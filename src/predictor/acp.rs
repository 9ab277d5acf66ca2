//! Aggregated conformal predictor: several ICPs trained on different
//! calibration splits, combined by taking medians.
use crate::data::{ClassLabel, Dataset, FeatureVector};
use crate::errors::ConformalError;
use crate::ncm::Ncm;
use crate::predictor::icp::Icp;
use crate::predictor::result::{ConfidenceInterval, Interval, PValues, RegressionPrediction};
use crate::sampler::SamplingStrategy;
use crate::utils::median;
use log::info;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug)]
pub struct Acp {
    pub(crate) template: Ncm,
    pub(crate) strategy: SamplingStrategy,
    pub(crate) seed: u64,
    pub(crate) members: BTreeMap<usize, Icp>,
    pub(crate) label_range: Option<(f64, f64)>,
}

impl Acp {
    pub fn new(ncm: Ncm, strategy: SamplingStrategy, seed: u64) -> Result<Self, ConformalError> {
        strategy.validate()?;
        Ok(Acp {
            template: ncm,
            strategy,
            seed,
            members: BTreeMap::new(),
            label_range: None,
        })
    }

    pub fn ncm(&self) -> &Ncm {
        &self.template
    }

    pub fn ncm_mut(&mut self) -> &mut Ncm {
        &mut self.template
    }

    pub fn strategy(&self) -> &SamplingStrategy {
        &self.strategy
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn num_members(&self) -> usize {
        self.strategy.num_splits()
    }

    pub fn members(&self) -> &BTreeMap<usize, Icp> {
        &self.members
    }

    /// Indices of the members trained so far.
    pub fn trained_members(&self) -> Vec<usize> {
        self.members.keys().copied().collect()
    }

    /// Smallest and largest label seen in training, used to cap intervals.
    pub fn label_range(&self) -> Option<(f64, f64)> {
        self.label_range
    }

    /// At least one member is trained, so predictions can be made.
    pub fn is_trained(&self) -> bool {
        !self.members.is_empty()
    }

    /// Every member of the sampling strategy is trained.
    pub fn is_fully_trained(&self) -> bool {
        self.members.len() == self.num_members()
    }

    /// Train every member, in parallel.
    pub fn train(&mut self, data: &Dataset) -> Result<(), ConformalError> {
        let all: Vec<usize> = (0..self.num_members()).collect();
        self.train_members(data, &all)
    }

    /// Train only the members in `indices`, e.g. one slice of a distributed job.
    ///
    /// The remaining members can be trained later or merged in from another
    /// predictor built with the same seed and strategy.
    pub fn train_members(&mut self, data: &Dataset, indices: &[usize]) -> Result<(), ConformalError> {
        let mut unique = BTreeSet::new();
        for i in indices {
            if *i >= self.num_members() {
                return Err(ConformalError::InvalidInput(format!(
                    "member index {} out of range for {} members",
                    i,
                    self.num_members()
                )));
            }
            if self.members.contains_key(i) || !unique.insert(*i) {
                return Err(ConformalError::AlreadyTrained(format!("aggregation member {}", i)));
            }
        }
        let task = self.template.task();
        let trained: Vec<(usize, Icp)> = indices
            .par_iter()
            .map(|i| {
                let split = self.strategy.split(data, self.seed, *i, task)?;
                let mut icp = Icp::new(self.template.clone());
                icp.train(&split)?;
                Ok((*i, icp))
            })
            .collect::<Result<_, ConformalError>>()?;
        self.label_range = union_range(self.label_range, data.label_range());
        self.members.extend(trained);
        info!(
            "Trained {} of {} aggregation members.",
            self.members.len(),
            self.num_members()
        );
        Ok(())
    }

    /// Combine the members of `other` into this predictor.
    ///
    /// Both sides must share seed, strategy and nonconformity measure, and no
    /// member index may be trained on both sides.
    pub fn merge(&mut self, other: Acp) -> Result<(), ConformalError> {
        check_compatible(
            (&self.strategy, self.seed, &self.template.describe()),
            (&other.strategy, other.seed, &other.template.describe()),
        )?;
        if let Some(i) = other.members.keys().find(|i| self.members.contains_key(*i)) {
            return Err(ConformalError::AggregationMismatch(format!(
                "member {} is trained in both predictors",
                i
            )));
        }
        self.label_range = union_range(self.label_range, other.label_range);
        self.members.extend(other.members);
        info!("Merged predictor now has {} of {} members.", self.members.len(), self.num_members());
        Ok(())
    }

    fn trained_iter(&self) -> Result<impl Iterator<Item = &Icp>, ConformalError> {
        if self.members.is_empty() {
            return Err(ConformalError::UntrainedPredictor("aggregated conformal predictor".to_string()));
        }
        Ok(self.members.values())
    }

    /// Median over members of each label's p-value. A member without
    /// calibration records of a label reports a p-value of one for it.
    pub fn predict_p_values(&self, features: &FeatureVector) -> Result<PValues, ConformalError> {
        let per_member: Vec<PValues> = self
            .trained_iter()?
            .map(|icp| icp.predict_p_values(features))
            .collect::<Result<_, ConformalError>>()?;
        let labels: BTreeSet<ClassLabel> = per_member.iter().flat_map(|p| p.keys().copied()).collect();
        Ok(labels
            .into_iter()
            .map(|l| {
                let values: Vec<f64> = per_member.iter().map(|p| p.get(&l).copied().unwrap_or(1.0)).collect();
                (l, median(&values))
            })
            .collect())
    }

    /// Median point prediction and median bounds over members.
    pub fn predict_intervals(
        &self,
        features: &FeatureVector,
        confidences: &[f64],
    ) -> Result<RegressionPrediction, ConformalError> {
        let per_member: Vec<RegressionPrediction> = self
            .trained_iter()?
            .map(|icp| icp.predict_intervals(features, confidences, None))
            .collect::<Result<_, ConformalError>>()?;
        let point = median(&per_member.iter().map(|p| p.point).collect::<Vec<_>>());
        let intervals = confidences
            .iter()
            .enumerate()
            .map(|(j, c)| {
                let lower: Vec<f64> = per_member.iter().map(|p| p.intervals[j].interval.lower).collect();
                let upper: Vec<f64> = per_member.iter().map(|p| p.intervals[j].interval.upper).collect();
                let interval = Interval::new(median(&lower), median(&upper));
                ConfidenceInterval {
                    confidence: *c,
                    interval,
                    capped: match self.label_range {
                        Some((lo, hi)) => interval.capped(lo, hi),
                        None => interval,
                    },
                }
            })
            .collect();
        Ok(RegressionPrediction { point, intervals })
    }

    /// Median over members of the confidence of `point ± half_width`.
    pub fn predict_confidence(&self, features: &FeatureVector, half_width: f64) -> Result<f64, ConformalError> {
        let values: Vec<f64> = self
            .trained_iter()?
            .map(|icp| icp.predict_confidence(features, half_width))
            .collect::<Result<_, ConformalError>>()?;
        Ok(median(&values))
    }
}

pub(crate) fn union_range(a: Option<(f64, f64)>, b: Option<(f64, f64)>) -> Option<(f64, f64)> {
    match (a, b) {
        (Some((lo_a, hi_a)), Some((lo_b, hi_b))) => Some((lo_a.min(lo_b), hi_a.max(hi_b))),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Aggregated predictors can only be combined when they would have sampled
/// the same splits with the same model.
pub(crate) fn check_compatible<D: PartialEq + std::fmt::Debug>(
    ours: (&SamplingStrategy, u64, &D),
    theirs: (&SamplingStrategy, u64, &D),
) -> Result<(), ConformalError> {
    if ours.1 != theirs.1 {
        return Err(ConformalError::AggregationMismatch(format!(
            "seeds differ: {} and {}",
            ours.1, theirs.1
        )));
    }
    if ours.0 != theirs.0 {
        return Err(ConformalError::AggregationMismatch(format!(
            "sampling strategies differ: {:?} and {:?}",
            ours.0, theirs.0
        )));
    }
    if ours.2 != theirs.2 {
        return Err(ConformalError::AggregationMismatch(format!(
            "models differ: {:?} and {:?}",
            ours.2, theirs.2
        )));
    }
    Ok(())
}
