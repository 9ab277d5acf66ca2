use crate::constants::QUANTILE_EPS;
use crate::errors::ConformalError;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// Nonconformity scores of a calibration set, sorted ascending.
///
/// Every query is a binary search, so p-values and interval boundaries cost
/// `O(log n)` per record.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct CalibrationScores {
    scores: Vec<f64>,
}

impl CalibrationScores {
    /// Sort `scores`; NaN scores are rejected.
    pub fn new(mut scores: Vec<f64>) -> Result<Self, ConformalError> {
        if scores.iter().any(|s| s.is_nan()) {
            return Err(ConformalError::InvalidInput(
                "calibration nonconformity scores contain NaN".to_string(),
            ));
        }
        scores.sort_unstable_by(|a, b| a.total_cmp(b));
        Ok(CalibrationScores { scores })
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.scores
    }

    /// `(#{s >= score} + 1) / (n + 1)`, always in (0, 1].
    pub fn p_value(&self, score: f64) -> f64 {
        let n = self.scores.len();
        let greater_or_equal = n - self.scores.partition_point(|s| *s < score);
        (greater_or_equal + 1) as f64 / (n + 1) as f64
    }

    /// The `ceil(confidence * (n + 1))`-th smallest score, `None` when that rank
    /// exceeds `n` and the region is unbounded.
    pub fn critical_score(&self, confidence: f64) -> Option<f64> {
        let n = self.scores.len();
        let rank = ((confidence * (n + 1) as f64) - QUANTILE_EPS).ceil().max(1.0) as usize;
        if rank > n {
            None
        } else {
            Some(self.scores[rank - 1])
        }
    }

    /// Largest confidence whose critical score is at most `score`, `#{s <= score} / (n + 1)`.
    pub fn confidence_for(&self, score: f64) -> f64 {
        let n = self.scores.len();
        self.scores.partition_point(|s| *s <= score) as f64 / (n + 1) as f64
    }
}

impl TryFrom<Vec<f64>> for CalibrationScores {
    type Error = ConformalError;

    fn try_from(scores: Vec<f64>) -> Result<Self, Self::Error> {
        CalibrationScores::new(scores)
    }
}

impl From<CalibrationScores> for Vec<f64> {
    fn from(scores: CalibrationScores) -> Self {
        scores.scores
    }
}
