//! Ways of holding out test records when evaluating a grid point.
use crate::data::{Dataset, Record, Task};
use crate::errors::ConformalError;
use crate::sampler::{by_class, calibration_size, fold_members};
use crate::utils::validate_float_parameter;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Training data (exclusive partitions included) and held-out test records.
#[derive(Clone, Debug)]
pub struct TestSplit {
    pub train: Dataset,
    pub test: Vec<Record>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum TestingStrategy {
    KFold {
        folds: usize,
        #[serde(default)]
        stratified: bool,
        #[serde(default)]
        seed: u64,
    },
    LeaveOneOut,
    TestTrainSplit {
        test_fraction: f64,
        #[serde(default)]
        stratified: bool,
        #[serde(default)]
        seed: u64,
    },
}

impl Default for TestingStrategy {
    fn default() -> Self {
        TestingStrategy::KFold {
            folds: 10,
            stratified: false,
            seed: 0,
        }
    }
}

impl TestingStrategy {
    /// Train/test splits of the normal partition of `data`. Exclusive records
    /// always stay on the training side.
    pub fn splits(&self, data: &Dataset, task: Task) -> Result<Vec<TestSplit>, ConformalError> {
        let records = data.records();
        let stratified = match self {
            TestingStrategy::KFold { stratified, .. } | TestingStrategy::TestTrainSplit { stratified, .. } => {
                *stratified
            }
            TestingStrategy::LeaveOneOut => false,
        };
        if stratified && task == Task::Regression {
            return Err(ConformalError::InvalidParameter(
                "stratified".to_string(),
                "false for regression".to_string(),
                "true".to_string(),
            ));
        }
        if records.len() < 2 {
            return Err(ConformalError::InvalidInput(format!(
                "at least two records are needed for testing, found {}",
                records.len()
            )));
        }

        let test_sets: Vec<Vec<usize>> = match self {
            TestingStrategy::KFold { folds, stratified, seed } => {
                if *folds < 2 {
                    return Err(ConformalError::InvalidParameter(
                        "folds".to_string(),
                        "integer of at least 2".to_string(),
                        folds.to_string(),
                    ));
                }
                fold_members(records, *folds, *stratified, *seed, task)?
            }
            TestingStrategy::LeaveOneOut => (0..records.len()).map(|i| vec![i]).collect(),
            TestingStrategy::TestTrainSplit {
                test_fraction,
                stratified,
                seed,
            } => {
                validate_float_parameter(*test_fraction, 0.0, 1.0, "test_fraction")?;
                if *test_fraction == 0.0 || *test_fraction == 1.0 {
                    return Err(ConformalError::InvalidParameter(
                        "test_fraction".to_string(),
                        "value in (0, 1)".to_string(),
                        test_fraction.to_string(),
                    ));
                }
                let mut rng = StdRng::seed_from_u64(*seed);
                let mut test = Vec::new();
                if *stratified {
                    for (_, mut members) in by_class(records)? {
                        members.shuffle(&mut rng);
                        if members.len() >= 2 {
                            test.extend_from_slice(&members[..calibration_size(members.len(), *test_fraction)]);
                        }
                    }
                } else {
                    let mut idx: Vec<usize> = (0..records.len()).collect();
                    idx.shuffle(&mut rng);
                    test.extend_from_slice(&idx[..calibration_size(records.len(), *test_fraction)]);
                }
                vec![test]
            }
        };

        Ok(test_sets
            .into_iter()
            .map(|test_index| {
                let mut is_test = vec![false; records.len()];
                for i in &test_index {
                    is_test[*i] = true;
                }
                let mut train = Vec::with_capacity(records.len() - test_index.len());
                let mut test = Vec::with_capacity(test_index.len());
                for (r, t) in records.iter().zip(is_test) {
                    if t {
                        test.push(r.clone());
                    } else {
                        train.push(r.clone());
                    }
                }
                TestSplit {
                    train: data.with_records(train),
                    test,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{make_classification, make_regression};

    #[test]
    fn test_kfold_tests_every_record_once() {
        let data = make_classification(30, 2);
        let strategy = TestingStrategy::KFold {
            folds: 3,
            stratified: true,
            seed: 4,
        };
        let splits = strategy.splits(&data, Task::Classification).unwrap();
        assert_eq!(splits.len(), 3);
        assert_eq!(splits.iter().map(|s| s.test.len()).sum::<usize>(), 30);
        for s in &splits {
            assert_eq!(s.train.len() + s.test.len(), 30);
            let labels = crate::data::class_labels(&s.test).unwrap();
            assert_eq!(labels.len(), 2);
        }
    }

    #[test]
    fn test_exclusive_records_stay_in_training() {
        let extra = make_regression(3, 9).records().to_vec();
        let data = make_regression(12, 8)
            .with_calibration_exclusive(extra[..1].to_vec())
            .with_modeling_exclusive(extra[1..].to_vec());
        for strategy in [
            TestingStrategy::LeaveOneOut,
            TestingStrategy::TestTrainSplit {
                test_fraction: 0.25,
                stratified: false,
                seed: 1,
            },
        ] {
            for split in strategy.splits(&data, Task::Regression).unwrap() {
                assert!(split.test.iter().all(|r| !extra.contains(r)));
                assert_eq!(split.train.calibration_exclusive(), &extra[..1]);
                assert_eq!(split.train.modeling_exclusive(), &extra[1..]);
            }
        }
        assert_eq!(TestingStrategy::LeaveOneOut.splits(&data, Task::Regression).unwrap().len(), 12);
    }

    #[test]
    fn test_invalid_strategies() {
        let data = make_regression(10, 1);
        let stratified = TestingStrategy::KFold {
            folds: 2,
            stratified: true,
            seed: 0,
        };
        assert!(stratified.splits(&data, Task::Regression).is_err());
        let bad_fraction = TestingStrategy::TestTrainSplit {
            test_fraction: 1.0,
            stratified: false,
            seed: 0,
        };
        assert!(bad_fraction.splits(&data, Task::Regression).is_err());
    }
}
