//! Inductive conformal predictor: one nonconformity measure calibrated on one
//! held-out calibration set.
use crate::calibration::CalibrationScores;
use crate::data::{ClassLabel, FeatureVector};
use crate::errors::ConformalError;
use crate::ncm::{Ncm, RegressionNcm};
use crate::predictor::result::{ConfidenceInterval, Interval, PValues, RegressionPrediction};
use crate::sampler::TrainSplit;
use crate::utils::validate_confidence;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Calibration scores, one list per class for classification.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum IcpCalibration {
    Mondrian(BTreeMap<ClassLabel, CalibrationScores>),
    Regression(CalibrationScores),
}

/// Inductive conformal predictor.
///
/// Starts untrained; [`Icp::train`] fits the measure and computes the
/// calibration scores exactly once. Retraining needs a new instance.
#[derive(Clone, Debug)]
pub struct Icp {
    pub(crate) ncm: Ncm,
    pub(crate) calibration: Option<IcpCalibration>,
}

fn check_finite(score: f64) -> Result<f64, ConformalError> {
    if score.is_nan() {
        Err(ConformalError::InvalidInput(
            "nonconformity measure produced a NaN score".to_string(),
        ))
    } else {
        Ok(score)
    }
}

impl Icp {
    pub fn new(ncm: Ncm) -> Self {
        Icp { ncm, calibration: None }
    }

    pub fn ncm(&self) -> &Ncm {
        &self.ncm
    }

    pub fn calibration(&self) -> Option<&IcpCalibration> {
        self.calibration.as_ref()
    }

    pub fn is_trained(&self) -> bool {
        self.calibration.is_some()
    }

    /// Fit the measure on the proper training set and score the calibration set.
    pub fn train(&mut self, split: &TrainSplit) -> Result<(), ConformalError> {
        if self.is_trained() {
            return Err(ConformalError::AlreadyTrained("inductive conformal predictor".to_string()));
        }
        split.validate(self.ncm.task())?;
        let mut ncm = self.ncm.clone();
        ncm.fit(&split.proper_training)?;

        let calibration = match &ncm {
            Ncm::Classification(cls) => {
                let mut labels: BTreeSet<ClassLabel> = crate::data::class_labels(&split.proper_training)?;
                labels.extend(crate::data::class_labels(&split.calibration)?);
                let labels: Vec<ClassLabel> = labels.into_iter().collect();
                let scored: Vec<(ClassLabel, f64)> = split
                    .calibration
                    .par_iter()
                    .map(|r| {
                        let class = r.class()?;
                        Ok((class, check_finite(cls.score(&r.features, class)?)?))
                    })
                    .collect::<Result<_, ConformalError>>()?;
                let mut per_class: BTreeMap<ClassLabel, Vec<f64>> = labels.iter().map(|l| (*l, Vec::new())).collect();
                for (class, score) in scored {
                    per_class.entry(class).or_default().push(score);
                }
                IcpCalibration::Mondrian(
                    per_class
                        .into_iter()
                        .map(|(l, s)| Ok((l, CalibrationScores::new(s)?)))
                        .collect::<Result<_, ConformalError>>()?,
                )
            }
            Ncm::Regression(reg) => {
                let scores: Vec<f64> = split
                    .calibration
                    .par_iter()
                    .map(|r| check_finite(reg.score(&r.features, r.label)?))
                    .collect::<Result<_, ConformalError>>()?;
                IcpCalibration::Regression(CalibrationScores::new(scores)?)
            }
        };
        self.ncm = ncm;
        self.calibration = Some(calibration);
        Ok(())
    }

    /// Candidate labels, in ascending order.
    pub fn labels(&self) -> Result<Vec<ClassLabel>, ConformalError> {
        match self.trained()? {
            IcpCalibration::Mondrian(per_class) => Ok(per_class.keys().copied().collect()),
            IcpCalibration::Regression(_) => Err(ConformalError::Unsupported(
                "labels of a regression predictor".to_string(),
            )),
        }
    }

    fn trained(&self) -> Result<&IcpCalibration, ConformalError> {
        self.calibration
            .as_ref()
            .ok_or_else(|| ConformalError::UntrainedPredictor("inductive conformal predictor".to_string()))
    }

    fn regression(&self) -> Result<(&RegressionNcm, &CalibrationScores), ConformalError> {
        match (&self.ncm, self.trained()?) {
            (Ncm::Regression(ncm), IcpCalibration::Regression(scores)) => Ok((ncm, scores)),
            _ => Err(ConformalError::Unsupported(
                "interval prediction with a classification predictor".to_string(),
            )),
        }
    }

    /// Mondrian p-value of every candidate label.
    pub fn predict_p_values(&self, features: &FeatureVector) -> Result<PValues, ConformalError> {
        match (&self.ncm, self.trained()?) {
            (Ncm::Classification(ncm), IcpCalibration::Mondrian(per_class)) => {
                let labels: Vec<ClassLabel> = per_class.keys().copied().collect();
                let scores = ncm.scores(features, &labels)?;
                let mut p_values = PValues::new();
                for (label, cal) in per_class {
                    p_values.insert(*label, cal.p_value(check_finite(scores[label])?));
                }
                Ok(p_values)
            }
            _ => Err(ConformalError::Unsupported(
                "p-value prediction with a regression predictor".to_string(),
            )),
        }
    }

    /// Point prediction and one interval per confidence. Intervals are
    /// unbounded when the calibration set is too small for the confidence.
    pub fn predict_intervals(
        &self,
        features: &FeatureVector,
        confidences: &[f64],
        label_range: Option<(f64, f64)>,
    ) -> Result<RegressionPrediction, ConformalError> {
        let (ncm, cal) = self.regression()?;
        let (y_hat, scale) = ncm.predict(features)?;
        let mut intervals = Vec::with_capacity(confidences.len());
        for c in confidences {
            validate_confidence(*c)?;
            let interval = match cal.critical_score(*c) {
                Some(alpha) => RegressionNcm::interval(y_hat, scale, alpha),
                None => Interval::unbounded(),
            };
            let capped = match label_range {
                Some((lo, hi)) => interval.capped(lo, hi),
                None => interval,
            };
            intervals.push(ConfidenceInterval {
                confidence: *c,
                interval,
                capped,
            });
        }
        Ok(RegressionPrediction { point: y_hat, intervals })
    }

    /// Confidence of the interval `point ± half_width`.
    pub fn predict_confidence(&self, features: &FeatureVector, half_width: f64) -> Result<f64, ConformalError> {
        if half_width.is_nan() || half_width < 0.0 {
            return Err(ConformalError::InvalidParameter(
                "half_width".to_string(),
                "non-negative value".to_string(),
                half_width.to_string(),
            ));
        }
        let (ncm, cal) = self.regression()?;
        let (_, scale) = ncm.predict(features)?;
        Ok(cal.confidence_for(half_width / scale))
    }
}
