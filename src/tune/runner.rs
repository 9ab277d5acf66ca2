use crate::data::Dataset;
use crate::errors::ConformalError;
use crate::metrics::Observation;
use crate::predictor::Predictor;
use crate::tune::testing::TestingStrategy;
use crate::utils::validate_confidence;
use rayon::prelude::*;

/// Trains a fresh copy of a predictor on every training side of a
/// [`TestingStrategy`] and predicts the held-out records.
#[derive(Clone, Debug)]
pub struct TestRunner {
    strategy: TestingStrategy,
    confidence: f64,
}

impl TestRunner {
    pub fn new(strategy: TestingStrategy, confidence: f64) -> Result<Self, ConformalError> {
        validate_confidence(confidence)?;
        Ok(TestRunner { strategy, confidence })
    }

    pub fn strategy(&self) -> &TestingStrategy {
        &self.strategy
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Observations of every test record, pooled over the splits in split order.
    pub fn evaluate(&self, template: &Predictor, data: &Dataset) -> Result<Vec<Observation>, ConformalError> {
        if template.is_trained() {
            return Err(ConformalError::AlreadyTrained(format!(
                "{:?} predictor used as a testing template",
                template.kind()
            )));
        }
        let splits = self.strategy.splits(data, template.task())?;
        let per_split: Vec<Vec<Observation>> = splits
            .par_iter()
            .map(|split| {
                let mut predictor = template.clone();
                predictor.train(&split.train)?;
                split
                    .test
                    .iter()
                    .map(|r| {
                        Ok(Observation {
                            label: r.label,
                            prediction: predictor.predict(&r.features, &[self.confidence])?,
                        })
                    })
                    .collect::<Result<Vec<_>, ConformalError>>()
            })
            .collect::<Result<_, ConformalError>>()?;
        Ok(per_split.into_iter().flatten().collect())
    }
}
