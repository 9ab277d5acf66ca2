use crate::data::class_of;
use crate::errors::ConformalError;
use crate::metrics::evaluation::{EvaluationMetric, Observation};
use crate::predictor::Prediction;

const MIN_PROBABILITY: f64 = 1e-15;

/// Probability assigned to the true label of `o`.
fn true_label_probability(o: &Observation) -> Result<f64, ConformalError> {
    match &o.prediction {
        Prediction::Probabilities(p) => Ok(p.probabilities.get(&class_of(o.label)?).copied().unwrap_or(0.0)),
        _ => Err(ConformalError::EvaluationFailure(
            "probabilistic metrics need probability predictions".to_string(),
        )),
    }
}

pub struct LogLossMetric {}
impl EvaluationMetric for LogLossMetric {
    fn calculate_metric(observations: &[Observation], _confidence: f64) -> Result<f64, ConformalError> {
        let mut total = 0.0;
        for o in observations {
            total -= true_label_probability(o)?.max(MIN_PROBABILITY).ln();
        }
        Ok(total / observations.len() as f64)
    }
    fn maximize() -> bool {
        false
    }
}

/// Mean squared distance between the predicted distribution and the true label.
/// For two classes this is `(1 - p_true)^2`.
pub struct BrierScoreMetric {}
impl EvaluationMetric for BrierScoreMetric {
    fn calculate_metric(observations: &[Observation], _confidence: f64) -> Result<f64, ConformalError> {
        let mut total = 0.0;
        for o in observations {
            total += (1.0 - true_label_probability(o)?).powi(2);
        }
        Ok(total / observations.len() as f64)
    }
    fn maximize() -> bool {
        false
    }
}
