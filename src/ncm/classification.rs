use crate::algorithm::{Algorithm, Classifier, Params};
use crate::data::{ClassLabel, FeatureVector, Record};
use crate::errors::ConformalError;
use crate::utils::items_to_strings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Nonconformity formulas for classification, all computed per candidate label.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassificationNcmKind {
    /// `1 - P(label | x)`, needs a probabilistic classifier.
    InverseProbability,
    /// `-s_label(x)` where `s` is the classifier decision score.
    NegativeLabelScore,
    /// `max_{l != label} s_l(x) - s_label(x)`.
    Margin,
}

impl FromStr for ClassificationNcmKind {
    type Err = ConformalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "InverseProbability" => Ok(ClassificationNcmKind::InverseProbability),
            "NegativeLabelScore" => Ok(ClassificationNcmKind::NegativeLabelScore),
            "Margin" => Ok(ClassificationNcmKind::Margin),
            _ => Err(ConformalError::ParseString(
                s.to_string(),
                "ClassificationNcmKind".to_string(),
                items_to_strings(vec!["InverseProbability", "NegativeLabelScore", "Margin"]),
            )),
        }
    }
}

/// Mondrian nonconformity measure backed by one classifier.
#[derive(Clone, Debug)]
pub struct ClassificationNcm {
    kind: ClassificationNcmKind,
    model: Box<dyn Classifier>,
}

impl ClassificationNcm {
    pub fn new(kind: ClassificationNcmKind, model: Box<dyn Classifier>) -> Result<Self, ConformalError> {
        if kind == ClassificationNcmKind::InverseProbability && !model.supports_probabilities() {
            return Err(ConformalError::InvalidParameter(
                "model".to_string(),
                "a classifier producing probabilities".to_string(),
                model.name().to_string(),
            ));
        }
        Ok(ClassificationNcm { kind, model })
    }

    pub fn kind(&self) -> ClassificationNcmKind {
        self.kind
    }

    pub fn model(&self) -> &dyn Classifier {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> &mut dyn Classifier {
        self.model.as_mut()
    }

    pub fn params(&self) -> Params {
        self.model.params()
    }

    pub fn set_param(&mut self, name: &str, value: &str) -> Result<(), ConformalError> {
        self.model.set_param(name, value)
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_fitted()
    }

    /// Train the underlying classifier on the proper training set.
    pub fn fit(&mut self, records: &[Record]) -> Result<(), ConformalError> {
        self.model.fit(records)
    }

    /// Nonconformity score of `features` under each hypothesis in `labels`.
    ///
    /// Labels the classifier never saw get a decision score (or probability) of zero.
    pub fn scores(
        &self,
        features: &FeatureVector,
        labels: &[ClassLabel],
    ) -> Result<BTreeMap<ClassLabel, f64>, ConformalError> {
        let outputs = match self.kind {
            ClassificationNcmKind::InverseProbability => self.model.probabilities(features)?,
            _ => self.model.decision_scores(features)?,
        };
        let output_of = |l: &ClassLabel| outputs.get(l).copied().unwrap_or(0.0);
        let mut scores = BTreeMap::new();
        for label in labels {
            let s = match self.kind {
                ClassificationNcmKind::InverseProbability => 1.0 - output_of(label),
                ClassificationNcmKind::NegativeLabelScore => -output_of(label),
                ClassificationNcmKind::Margin => {
                    let best_other = outputs
                        .iter()
                        .filter(|(l, _)| *l != label)
                        .map(|(_, v)| *v)
                        .chain(labels.iter().filter(|l| *l != label && !outputs.contains_key(*l)).map(|_| 0.0))
                        .fold(f64::NEG_INFINITY, f64::max);
                    best_other - output_of(label)
                }
            };
            scores.insert(*label, s);
        }
        Ok(scores)
    }

    /// Nonconformity score of `features` under the hypothesis `label`.
    pub fn score(&self, features: &FeatureVector, label: ClassLabel) -> Result<f64, ConformalError> {
        Ok(self.scores(features, &[label])?[&label])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::KnnClassifier;

    fn fitted(kind: ClassificationNcmKind) -> ClassificationNcm {
        let r = |x: f64, y: f64| Record::new(FeatureVector::from_dense(&[x, 1.0]).unwrap(), y);
        let mut ncm = ClassificationNcm::new(kind, Box::new(KnnClassifier::new(3, false))).unwrap();
        ncm.fit(&[r(0.0, 0.0), r(0.1, 0.0), r(0.2, 1.0), r(5.0, 1.0), r(5.1, 1.0)])
            .unwrap();
        ncm
    }

    #[test]
    fn test_conforming_label_scores_lower() {
        let x = FeatureVector::from_dense(&[0.05, 1.0]).unwrap();
        for kind in [
            ClassificationNcmKind::InverseProbability,
            ClassificationNcmKind::NegativeLabelScore,
            ClassificationNcmKind::Margin,
        ] {
            let scores = fitted(kind).scores(&x, &[0, 1]).unwrap();
            assert!(scores[&0] < scores[&1], "{:?}: {:?}", kind, scores);
        }
    }

    #[test]
    fn test_margin_values() {
        let x = FeatureVector::from_dense(&[0.05, 1.0]).unwrap();
        let ncm = fitted(ClassificationNcmKind::Margin);
        let scores = ncm.scores(&x, &[0, 1, 7]).unwrap();
        let third = 1.0 / 3.0;
        assert!((scores[&0] - (third - 2.0 * third)).abs() < 1e-12);
        assert!((scores[&1] - (2.0 * third - third)).abs() < 1e-12);
        assert!((scores[&7] - 2.0 * third).abs() < 1e-12);
        assert_eq!(ncm.score(&x, 1).unwrap(), scores[&1]);
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("Margin".parse::<ClassificationNcmKind>().unwrap(), ClassificationNcmKind::Margin);
        assert!("Hinge".parse::<ClassificationNcmKind>().is_err());
    }
}
