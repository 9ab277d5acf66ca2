//! Transductive conformal predictor for classification.
//!
//! Every prediction refits the measure once per candidate label on the
//! training records augmented with the test record, which is exact but costly.
use crate::calibration::CalibrationScores;
use crate::data::{class_labels, ClassLabel, Dataset, FeatureVector, Record};
use crate::errors::ConformalError;
use crate::ncm::{ClassificationNcm, Ncm};
use crate::predictor::result::PValues;
use rayon::prelude::*;

#[derive(Clone, Debug)]
pub struct Tcp {
    pub(crate) ncm: ClassificationNcm,
    /// Compare only with training records of the candidate label.
    pub(crate) mondrian: bool,
    pub(crate) records: Vec<Record>,
    pub(crate) labels: Vec<ClassLabel>,
}

impl Tcp {
    pub fn new(ncm: Ncm) -> Result<Self, ConformalError> {
        match ncm {
            Ncm::Classification(ncm) => Ok(Tcp {
                ncm,
                mondrian: true,
                records: Vec::new(),
                labels: Vec::new(),
            }),
            Ncm::Regression(_) => Err(ConformalError::Unsupported(
                "transductive prediction of regression labels".to_string(),
            )),
        }
    }

    pub fn with_mondrian(mut self, mondrian: bool) -> Self {
        self.mondrian = mondrian;
        self
    }

    pub fn ncm(&self) -> &ClassificationNcm {
        &self.ncm
    }

    pub fn ncm_mut(&mut self) -> &mut ClassificationNcm {
        &mut self.ncm
    }

    pub fn is_mondrian(&self) -> bool {
        self.mondrian
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn is_trained(&self) -> bool {
        !self.records.is_empty()
    }

    /// Model fits needed for a single prediction.
    pub fn retrains_per_prediction(&self) -> usize {
        self.labels.len()
    }

    /// Store every record of `data`. Nothing is fitted until prediction.
    pub fn train(&mut self, data: &Dataset) -> Result<(), ConformalError> {
        if self.is_trained() {
            return Err(ConformalError::AlreadyTrained("transductive conformal predictor".to_string()));
        }
        let records: Vec<Record> = data.all_records().cloned().collect();
        let labels = class_labels(&records)?;
        if labels.len() < 2 {
            return Err(ConformalError::InvalidInput(format!(
                "training data must contain at least two classes, found {}",
                labels.len()
            )));
        }
        self.labels = labels.into_iter().collect();
        self.records = records;
        Ok(())
    }

    pub fn predict_p_values(&self, features: &FeatureVector) -> Result<PValues, ConformalError> {
        if !self.is_trained() {
            return Err(ConformalError::UntrainedPredictor("transductive conformal predictor".to_string()));
        }
        self.labels
            .par_iter()
            .map(|label| Ok((*label, self.p_value(features, *label)?)))
            .collect()
    }

    fn p_value(&self, features: &FeatureVector, label: ClassLabel) -> Result<f64, ConformalError> {
        let mut augmented = Vec::with_capacity(self.records.len() + 1);
        augmented.extend_from_slice(&self.records);
        augmented.push(Record::new(features.clone(), label as f64));
        let mut ncm = self.ncm.clone();
        ncm.fit(&augmented)?;

        let mut scores = Vec::with_capacity(self.records.len());
        for r in &self.records {
            let class = r.class()?;
            if !self.mondrian || class == label {
                scores.push(ncm.score(&r.features, class)?);
            }
        }
        let test_score = ncm.score(features, label)?;
        if test_score.is_nan() {
            return Err(ConformalError::InvalidInput(
                "nonconformity measure produced a NaN score".to_string(),
            ));
        }
        Ok(CalibrationScores::new(scores)?.p_value(test_score))
    }
}
