//! Sampler
//!
//! Strategies for partitioning a training dataset into proper-training and
//! calibration sets, one split per aggregation member.
//!
//! Every split is a pure function of `(dataset, seed, index)`, so member `i`
//! of an aggregated predictor can be trained on another machine and still see
//! exactly the split it would have seen locally.
use crate::data::{ClassLabel, Dataset, Record, Task};
use crate::errors::ConformalError;
use crate::utils::{mix_seed, validate_float_parameter};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Proper training set and calibration set for one aggregation member.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainSplit {
    pub proper_training: Vec<Record>,
    pub calibration: Vec<Record>,
}

impl TrainSplit {
    /// Check the split can be used to calibrate a predictor.
    pub fn validate(&self, task: Task) -> Result<(), ConformalError> {
        if self.proper_training.is_empty() {
            return Err(ConformalError::InvalidInput("proper training set is empty".to_string()));
        }
        if self.calibration.is_empty() {
            return Err(ConformalError::InvalidInput("calibration set is empty".to_string()));
        }
        if task == Task::Classification {
            let labels: BTreeSet<ClassLabel> = crate::data::class_labels(&self.calibration)?;
            if labels.len() < 2 {
                return Err(ConformalError::InvalidInput(format!(
                    "calibration set must contain at least two classes, found {}",
                    labels.len()
                )));
            }
        }
        Ok(())
    }
}

/// How calibration sets are drawn.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum SamplingStrategy {
    /// `num_samples` independent random splits holding out `calibration_ratio` of the records.
    Random {
        num_samples: usize,
        calibration_ratio: f64,
        #[serde(default)]
        stratified: bool,
    },
    /// `folds` disjoint folds, each one the calibration set of one split.
    Folded {
        folds: usize,
        #[serde(default)]
        stratified: bool,
    },
    /// Proper training set drawn with replacement, out-of-bag records calibrate.
    Bootstrap { num_samples: usize },
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        SamplingStrategy::Random {
            num_samples: crate::constants::DEFAULT_NUM_SAMPLES,
            calibration_ratio: crate::constants::DEFAULT_CALIBRATION_RATIO,
            stratified: false,
        }
    }
}

impl SamplingStrategy {
    /// Number of splits, which is the number of aggregation members.
    pub fn num_splits(&self) -> usize {
        match self {
            SamplingStrategy::Random { num_samples, .. } => *num_samples,
            SamplingStrategy::Folded { folds, .. } => *folds,
            SamplingStrategy::Bootstrap { num_samples } => *num_samples,
        }
    }

    pub fn is_stratified(&self) -> bool {
        match self {
            SamplingStrategy::Random { stratified, .. } | SamplingStrategy::Folded { stratified, .. } => *stratified,
            SamplingStrategy::Bootstrap { .. } => false,
        }
    }

    /// Check the strategy's own parameters.
    pub fn validate(&self) -> Result<(), ConformalError> {
        match self {
            SamplingStrategy::Random {
                num_samples,
                calibration_ratio,
                ..
            } => {
                if *num_samples == 0 {
                    return Err(invalid("num_samples", "positive integer", num_samples));
                }
                validate_float_parameter(*calibration_ratio, 0.0, 1.0, "calibration_ratio")?;
                if *calibration_ratio == 0.0 || *calibration_ratio == 1.0 {
                    return Err(invalid("calibration_ratio", "value in (0, 1)", calibration_ratio));
                }
                Ok(())
            }
            SamplingStrategy::Folded { folds, .. } => {
                if *folds < 2 {
                    return Err(invalid("folds", "integer of at least 2", folds));
                }
                Ok(())
            }
            SamplingStrategy::Bootstrap { num_samples } => {
                if *num_samples == 0 {
                    return Err(invalid("num_samples", "positive integer", num_samples));
                }
                Ok(())
            }
        }
    }

    /// Split `index` of this strategy for `data` under `seed`.
    pub fn split(&self, data: &Dataset, seed: u64, index: usize, task: Task) -> Result<TrainSplit, ConformalError> {
        self.validate()?;
        if index >= self.num_splits() {
            return Err(ConformalError::InvalidInput(format!(
                "split index {} out of range for {} splits",
                index,
                self.num_splits()
            )));
        }
        if self.is_stratified() && task == Task::Regression {
            return Err(ConformalError::InvalidParameter(
                "stratified".to_string(),
                "false for regression".to_string(),
                "true".to_string(),
            ));
        }
        let records = data.records();
        if records.len() < 2 {
            return Err(ConformalError::InvalidInput(format!(
                "at least two records are needed to sample a calibration set, found {}",
                records.len()
            )));
        }

        let calibration_index: Vec<usize> = match self {
            SamplingStrategy::Random {
                calibration_ratio,
                stratified,
                ..
            } => {
                let mut rng = StdRng::seed_from_u64(mix_seed(seed, index as u64));
                if *stratified {
                    let mut chosen = Vec::new();
                    for (_, mut members) in by_class(records)? {
                        members.shuffle(&mut rng);
                        let n_cal = if members.len() < 2 {
                            0
                        } else {
                            calibration_size(members.len(), *calibration_ratio)
                        };
                        chosen.extend_from_slice(&members[..n_cal]);
                    }
                    chosen
                } else {
                    let mut idx: Vec<usize> = (0..records.len()).collect();
                    idx.shuffle(&mut rng);
                    idx.truncate(calibration_size(records.len(), *calibration_ratio));
                    idx
                }
            }
            SamplingStrategy::Folded { folds, stratified } => {
                let mut members = fold_members(records, *folds, *stratified, seed, task)?;
                members.swap_remove(index)
            }
            SamplingStrategy::Bootstrap { .. } => {
                let mut rng = StdRng::seed_from_u64(mix_seed(seed, index as u64));
                let n = records.len();
                let mut in_bag = vec![0usize; n];
                for _ in 0..n {
                    in_bag[rng.gen_range(0..n)] += 1;
                }
                let out_of_bag: Vec<usize> = (0..n).filter(|i| in_bag[*i] == 0).collect();
                let mut proper: Vec<Record> = Vec::with_capacity(n + data.modeling_exclusive().len());
                for (i, count) in in_bag.iter().enumerate() {
                    for _ in 0..*count {
                        proper.push(records[i].clone());
                    }
                }
                return finish_split(data, proper, out_of_bag.iter().map(|i| records[*i].clone()).collect(), task);
            }
        };

        let mut is_calibration = vec![false; records.len()];
        for i in &calibration_index {
            is_calibration[*i] = true;
        }
        let mut proper = Vec::with_capacity(records.len() - calibration_index.len());
        let mut calibration = Vec::with_capacity(calibration_index.len());
        for (record, cal) in records.iter().zip(is_calibration) {
            if cal {
                calibration.push(record.clone());
            } else {
                proper.push(record.clone());
            }
        }
        finish_split(data, proper, calibration, task)
    }

    /// Lazy sequence of all splits. The iterator is `Clone`, so it can be
    /// restarted, and `nth` skips directly to a split without computing the
    /// ones before it.
    pub fn splits<'a>(&'a self, data: &'a Dataset, seed: u64, task: Task) -> Splits<'a> {
        Splits {
            strategy: self,
            data,
            seed,
            task,
            next: 0,
        }
    }
}

fn invalid<T: ToString>(name: &str, expected: &str, value: &T) -> ConformalError {
    ConformalError::InvalidParameter(name.to_string(), expected.to_string(), value.to_string())
}

/// Calibration set size, at least one record and leaving at least one for training.
pub(crate) fn calibration_size(n: usize, ratio: f64) -> usize {
    ((n as f64 * ratio).round() as usize).clamp(1, n - 1)
}

pub(crate) fn by_class(records: &[Record]) -> Result<BTreeMap<ClassLabel, Vec<usize>>, ConformalError> {
    let mut classes: BTreeMap<ClassLabel, Vec<usize>> = BTreeMap::new();
    for (i, r) in records.iter().enumerate() {
        classes.entry(r.class()?).or_default().push(i);
    }
    Ok(classes)
}

/// Record indices of every fold. The shuffle only depends on `seed`, so all
/// folds come from the same permutation.
pub(crate) fn fold_members(
    records: &[Record],
    folds: usize,
    stratified: bool,
    seed: u64,
    task: Task,
) -> Result<Vec<Vec<usize>>, ConformalError> {
    if records.len() < folds {
        return Err(ConformalError::InvalidInput(format!(
            "{} records cannot be divided into {} folds",
            records.len(),
            folds
        )));
    }
    if task == Task::Classification {
        for (label, members) in by_class(records)? {
            if members.len() < folds {
                return Err(ConformalError::InvalidInput(format!(
                    "class {} has {} records, fewer than the {} folds",
                    label,
                    members.len(),
                    folds
                )));
            }
        }
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = Vec::with_capacity(records.len());
    if stratified {
        for (_, mut members) in by_class(records)? {
            members.shuffle(&mut rng);
            order.extend(members);
        }
    } else {
        order.extend(0..records.len());
        order.shuffle(&mut rng);
    }
    // Round-robin keeps every class spread over the folds when the order is grouped by class.
    let mut members = vec![Vec::with_capacity(records.len() / folds + 1); folds];
    for (pos, i) in order.into_iter().enumerate() {
        members[pos % folds].push(i);
    }
    Ok(members)
}

fn finish_split(
    data: &Dataset,
    mut proper_training: Vec<Record>,
    mut calibration: Vec<Record>,
    task: Task,
) -> Result<TrainSplit, ConformalError> {
    proper_training.extend_from_slice(data.modeling_exclusive());
    calibration.extend_from_slice(data.calibration_exclusive());
    let split = TrainSplit {
        proper_training,
        calibration,
    };
    split.validate(task)?;
    Ok(split)
}

/// Iterator over the splits of a [`SamplingStrategy`].
#[derive(Clone)]
pub struct Splits<'a> {
    strategy: &'a SamplingStrategy,
    data: &'a Dataset,
    seed: u64,
    task: Task,
    next: usize,
}

impl<'a> Iterator for Splits<'a> {
    type Item = Result<TrainSplit, ConformalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.strategy.num_splits() {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.strategy.split(self.data, self.seed, index, self.task))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.next = self.next.saturating_add(n);
        self.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.strategy.num_splits().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for Splits<'a> {}
