//! Data
//!
//! Sparse feature vectors, labeled records and datasets with
//! calibration-exclusive and modeling-exclusive partitions.
use crate::errors::ConformalError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Class identifier used by classification predictors.
pub type ClassLabel = i64;

/// Kind of label a predictor works with.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Task {
    Classification,
    Regression,
}

/// Sparse feature vector, indices are unique and stored in ascending order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct FeatureVector {
    entries: Vec<(usize, f64)>,
}

impl FeatureVector {
    /// Build a feature vector from `(index, value)` pairs in any order.
    ///
    /// Duplicate indices and non-finite values are rejected.
    pub fn new(mut entries: Vec<(usize, f64)>) -> Result<Self, ConformalError> {
        entries.sort_unstable_by_key(|(i, _)| *i);
        for w in entries.windows(2) {
            if w[0].0 == w[1].0 {
                return Err(ConformalError::InvalidInput(format!(
                    "feature index {} occurs more than once",
                    w[0].0
                )));
            }
        }
        if let Some((i, v)) = entries.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConformalError::InvalidInput(format!(
                "feature {} has non-finite value {}",
                i, v
            )));
        }
        Ok(FeatureVector { entries })
    }

    /// Build a sparse vector from dense values, zeros are not stored.
    pub fn from_dense(values: &[f64]) -> Result<Self, ConformalError> {
        FeatureVector::new(
            values
                .iter()
                .enumerate()
                .filter(|(_, v)| **v != 0.0)
                .map(|(i, v)| (i, *v))
                .collect(),
        )
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value at `index`, zero when not stored.
    pub fn get(&self, index: usize) -> f64 {
        match self.entries.binary_search_by_key(&index, |(i, _)| *i) {
            Ok(pos) => self.entries[pos].1,
            Err(_) => 0.0,
        }
    }

    /// Squared euclidean distance, computed by walking both index lists.
    pub fn squared_distance(&self, other: &FeatureVector) -> f64 {
        let (a, b) = (&self.entries, &other.entries);
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < a.len() && j < b.len() {
            match a[i].0.cmp(&b[j].0) {
                std::cmp::Ordering::Less => {
                    sum += a[i].1 * a[i].1;
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    sum += b[j].1 * b[j].1;
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    let d = a[i].1 - b[j].1;
                    sum += d * d;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum += a[i..].iter().map(|(_, v)| v * v).sum::<f64>();
        sum += b[j..].iter().map(|(_, v)| v * v).sum::<f64>();
        sum
    }
}

/// A feature vector and its label. Classification labels are integral values.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Record {
    pub features: FeatureVector,
    pub label: f64,
}

impl Record {
    pub fn new(features: FeatureVector, label: f64) -> Self {
        Record { features, label }
    }

    /// The label read as a class identifier.
    pub fn class(&self) -> Result<ClassLabel, ConformalError> {
        class_of(self.label)
    }
}

/// Read a label value as a class identifier.
pub fn class_of(label: f64) -> Result<ClassLabel, ConformalError> {
    if !label.is_finite() || label.fract() != 0.0 {
        return Err(ConformalError::InvalidInput(format!(
            "label {} is not a valid class label",
            label
        )));
    }
    Ok(label as ClassLabel)
}

/// The distinct class labels among `records`.
pub fn class_labels(records: &[Record]) -> Result<BTreeSet<ClassLabel>, ConformalError> {
    records.iter().map(Record::class).collect()
}

/// Ordered records plus the records that must always land in the calibration
/// set or in the proper training set.
///
/// The three partitions are kept in separate collections, so they never overlap.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    records: Vec<Record>,
    #[serde(default)]
    calibration_exclusive: Vec<Record>,
    #[serde(default)]
    modeling_exclusive: Vec<Record>,
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        Dataset {
            records,
            calibration_exclusive: Vec::new(),
            modeling_exclusive: Vec::new(),
        }
    }

    pub fn with_calibration_exclusive(mut self, records: Vec<Record>) -> Self {
        self.calibration_exclusive = records;
        self
    }

    pub fn with_modeling_exclusive(mut self, records: Vec<Record>) -> Self {
        self.modeling_exclusive = records;
        self
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn calibration_exclusive(&self) -> &[Record] {
        &self.calibration_exclusive
    }

    pub fn modeling_exclusive(&self) -> &[Record] {
        &self.modeling_exclusive
    }

    /// Total number of records over all three partitions.
    pub fn len(&self) -> usize {
        self.records.len() + self.calibration_exclusive.len() + self.modeling_exclusive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record, normal partition first.
    pub fn all_records(&self) -> impl Iterator<Item = &Record> {
        self.records
            .iter()
            .chain(self.calibration_exclusive.iter())
            .chain(self.modeling_exclusive.iter())
    }

    /// Distinct class labels over all partitions.
    pub fn class_labels(&self) -> Result<BTreeSet<ClassLabel>, ConformalError> {
        self.all_records().map(Record::class).collect()
    }

    /// Smallest and largest finite label over all partitions.
    pub fn label_range(&self) -> Option<(f64, f64)> {
        self.all_records().filter(|r| r.label.is_finite()).fold(None, |acc, r| match acc {
            None => Some((r.label, r.label)),
            Some((lo, hi)) => Some((lo.min(r.label), hi.max(r.label))),
        })
    }

    /// A new dataset with the same exclusive partitions and `records` as the normal partition.
    pub fn with_records(&self, records: Vec<Record>) -> Dataset {
        Dataset {
            records,
            calibration_exclusive: self.calibration_exclusive.clone(),
            modeling_exclusive: self.modeling_exclusive.clone(),
        }
    }
}
