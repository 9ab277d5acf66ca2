//! k-nearest-neighbour classifier and regressor over sparse feature vectors.
use crate::algorithm::{Algorithm, Classifier, Params, Regressor};
use crate::constants::DEFAULT_K;
use crate::data::{class_labels, ClassLabel, FeatureVector, Record};
use crate::errors::ConformalError;
use crate::utils::parse_param;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The `k` records closest to `features` with their vote weights, nearest first.
fn neighbours<'a>(records: &'a [Record], features: &FeatureVector, k: usize, weighted: bool) -> Vec<(f64, &'a Record)> {
    let mut dists: Vec<(f64, usize)> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.features.squared_distance(features), i))
        .collect();
    let k = k.min(dists.len());
    let by_dist = |a: &(f64, usize), b: &(f64, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
    if k < dists.len() {
        dists.select_nth_unstable_by(k, by_dist);
        dists.truncate(k);
    }
    dists.sort_unstable_by(by_dist);
    dists
        .into_iter()
        .map(|(d, i)| {
            let w = if weighted { 1.0 / (1.0 + d.sqrt()) } else { 1.0 };
            (w, &records[i])
        })
        .collect()
}

fn set_knn_param(
    k: &mut usize,
    weighted: &mut bool,
    name: &str,
    value: &str,
    owner: &str,
) -> Result<(), ConformalError> {
    match name {
        "k" => {
            let v: usize = parse_param(name, value, "positive integer")?;
            if v == 0 {
                return Err(ConformalError::InvalidParameter(
                    name.to_string(),
                    "positive integer".to_string(),
                    value.to_string(),
                ));
            }
            *k = v;
            Ok(())
        }
        "weighted" => {
            *weighted = parse_param(name, value, "true or false")?;
            Ok(())
        }
        _ => Err(ConformalError::UnknownParameter(name.to_string(), owner.to_string())),
    }
}

fn knn_params(k: usize, weighted: bool) -> Params {
    let mut p = Params::new();
    p.insert("k".to_string(), k.to_string());
    p.insert("weighted".to_string(), weighted.to_string());
    p
}

/// Majority vote over the `k` nearest training records.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct KnnClassifier {
    pub k: usize,
    /// Weight votes by `1 / (1 + distance)`.
    pub weighted: bool,
    records: Vec<Record>,
    labels: Vec<ClassLabel>,
}

impl Default for KnnClassifier {
    fn default() -> Self {
        KnnClassifier::new(DEFAULT_K, true)
    }
}

impl KnnClassifier {
    pub const NAME: &'static str = "KnnClassifier";

    pub fn new(k: usize, weighted: bool) -> Self {
        KnnClassifier {
            k,
            weighted,
            records: Vec::new(),
            labels: Vec::new(),
        }
    }

    fn votes(&self, features: &FeatureVector) -> Result<BTreeMap<ClassLabel, f64>, ConformalError> {
        if !self.is_fitted() {
            return Err(ConformalError::UntrainedPredictor(Self::NAME.to_string()));
        }
        let mut votes: BTreeMap<ClassLabel, f64> = self.labels.iter().map(|l| (*l, 0.0)).collect();
        for (w, r) in neighbours(&self.records, features, self.k, self.weighted) {
            *votes.entry(r.class()?).or_insert(0.0) += w;
        }
        Ok(votes)
    }
}

impl Algorithm for KnnClassifier {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn params(&self) -> Params {
        knn_params(self.k, self.weighted)
    }

    fn set_param(&mut self, name: &str, value: &str) -> Result<(), ConformalError> {
        set_knn_param(&mut self.k, &mut self.weighted, name, value, Self::NAME)
    }

    fn is_fitted(&self) -> bool {
        !self.records.is_empty()
    }

    fn state(&self) -> Result<Vec<u8>, ConformalError> {
        serde_json::to_vec(self).map_err(|e| ConformalError::UnableToWrite(e.to_string()))
    }

    fn restore(&mut self, state: &[u8]) -> Result<(), ConformalError> {
        *self = serde_json::from_slice(state).map_err(|e| ConformalError::UnableToRead(e.to_string()))?;
        Ok(())
    }
}

impl Classifier for KnnClassifier {
    fn fit(&mut self, records: &[Record]) -> Result<(), ConformalError> {
        let labels = class_labels(records)?;
        if labels.len() < 2 {
            return Err(ConformalError::InvalidInput(format!(
                "{} requires at least two classes, found {}",
                Self::NAME,
                labels.len()
            )));
        }
        self.labels = labels.into_iter().collect();
        self.records = records.to_vec();
        Ok(())
    }

    fn decision_scores(&self, features: &FeatureVector) -> Result<BTreeMap<ClassLabel, f64>, ConformalError> {
        let mut votes = self.votes(features)?;
        let total: f64 = votes.values().sum();
        if total > 0.0 {
            votes.values_mut().for_each(|v| *v /= total);
        }
        Ok(votes)
    }

    fn supports_probabilities(&self) -> bool {
        true
    }

    /// Laplace-smoothed vote fractions, never exactly zero or one.
    fn probabilities(&self, features: &FeatureVector) -> Result<BTreeMap<ClassLabel, f64>, ConformalError> {
        let fractions = self.decision_scores(features)?;
        let k = self.k.min(self.records.len()) as f64;
        let m = fractions.len() as f64;
        Ok(fractions.into_iter().map(|(l, f)| (l, (f * k + 1.0) / (k + m))).collect())
    }

    fn clone_box(&self) -> Box<dyn Classifier> {
        Box::new(self.clone())
    }
}

/// Mean label of the `k` nearest training records.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct KnnRegressor {
    pub k: usize,
    pub weighted: bool,
    records: Vec<Record>,
}

impl Default for KnnRegressor {
    fn default() -> Self {
        KnnRegressor::new(DEFAULT_K, true)
    }
}

impl KnnRegressor {
    pub const NAME: &'static str = "KnnRegressor";

    pub fn new(k: usize, weighted: bool) -> Self {
        KnnRegressor {
            k,
            weighted,
            records: Vec::new(),
        }
    }
}

impl Algorithm for KnnRegressor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn params(&self) -> Params {
        knn_params(self.k, self.weighted)
    }

    fn set_param(&mut self, name: &str, value: &str) -> Result<(), ConformalError> {
        set_knn_param(&mut self.k, &mut self.weighted, name, value, Self::NAME)
    }

    fn is_fitted(&self) -> bool {
        !self.records.is_empty()
    }

    fn state(&self) -> Result<Vec<u8>, ConformalError> {
        serde_json::to_vec(self).map_err(|e| ConformalError::UnableToWrite(e.to_string()))
    }

    fn restore(&mut self, state: &[u8]) -> Result<(), ConformalError> {
        *self = serde_json::from_slice(state).map_err(|e| ConformalError::UnableToRead(e.to_string()))?;
        Ok(())
    }
}

impl Regressor for KnnRegressor {
    fn fit(&mut self, records: &[Record]) -> Result<(), ConformalError> {
        if records.is_empty() {
            return Err(ConformalError::InvalidInput(format!("{} requires training records", Self::NAME)));
        }
        if let Some(r) = records.iter().find(|r| !r.label.is_finite()) {
            return Err(ConformalError::InvalidInput(format!("non-finite label {}", r.label)));
        }
        self.records = records.to_vec();
        Ok(())
    }

    fn predict(&self, features: &FeatureVector) -> Result<f64, ConformalError> {
        if !self.is_fitted() {
            return Err(ConformalError::UntrainedPredictor(Self::NAME.to_string()));
        }
        let (mut num, mut den) = (0.0, 0.0);
        for (w, r) in neighbours(&self.records, features, self.k, self.weighted) {
            num += w * r.label;
            den += w;
        }
        Ok(num / den)
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}
