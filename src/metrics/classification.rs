use crate::data::class_of;
use crate::errors::ConformalError;
use crate::metrics::evaluation::{EvaluationMetric, Observation};
use crate::predictor::result::{prediction_set, PValues};
use crate::predictor::Prediction;

fn p_values(o: &Observation) -> Result<&PValues, ConformalError> {
    match &o.prediction {
        Prediction::PValues(p) => Ok(p),
        _ => Err(ConformalError::EvaluationFailure(
            "classification metrics need p-value predictions".to_string(),
        )),
    }
}

fn mean_over<F>(observations: &[Observation], f: F) -> Result<f64, ConformalError>
where
    F: Fn(&Observation) -> Result<f64, ConformalError>,
{
    let mut total = 0.0;
    for o in observations {
        total += f(o)?;
    }
    Ok(total / observations.len() as f64)
}

pub struct ObservedFuzzinessMetric {}
impl EvaluationMetric for ObservedFuzzinessMetric {
    fn calculate_metric(observations: &[Observation], _confidence: f64) -> Result<f64, ConformalError> {
        observed_fuzziness(observations)
    }
    fn maximize() -> bool {
        false
    }
}

pub struct AverageSetSizeMetric {}
impl EvaluationMetric for AverageSetSizeMetric {
    fn calculate_metric(observations: &[Observation], confidence: f64) -> Result<f64, ConformalError> {
        average_set_size(observations, confidence)
    }
    fn maximize() -> bool {
        false
    }
}

pub struct SingleLabelFractionMetric {}
impl EvaluationMetric for SingleLabelFractionMetric {
    fn calculate_metric(observations: &[Observation], confidence: f64) -> Result<f64, ConformalError> {
        single_label_fraction(observations, confidence)
    }
    fn maximize() -> bool {
        true
    }
}

/// Mean sum of the p-values of the false labels.
pub fn observed_fuzziness(observations: &[Observation]) -> Result<f64, ConformalError> {
    mean_over(observations, |o| {
        let truth = class_of(o.label)?;
        Ok(p_values(o)?.iter().filter(|(l, _)| **l != truth).map(|(_, p)| *p).sum())
    })
}

pub fn average_set_size(observations: &[Observation], confidence: f64) -> Result<f64, ConformalError> {
    mean_over(observations, |o| Ok(prediction_set(p_values(o)?, confidence).len() as f64))
}

pub fn single_label_fraction(observations: &[Observation], confidence: f64) -> Result<f64, ConformalError> {
    mean_over(observations, |o| {
        Ok(if prediction_set(p_values(o)?, confidence).len() == 1 {
            1.0
        } else {
            0.0
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(label: f64, p: &[(i64, f64)]) -> Observation {
        Observation {
            label,
            prediction: Prediction::PValues(p.iter().copied().collect()),
        }
    }

    #[test]
    fn test_set_metrics() {
        let observations = vec![
            obs(0.0, &[(0, 0.6), (1, 0.05)]),
            obs(1.0, &[(0, 0.3), (1, 0.4)]),
            obs(1.0, &[(0, 0.1), (1, 0.15)]),
        ];
        assert!((observed_fuzziness(&observations).unwrap() - (0.05 + 0.3 + 0.1) / 3.0).abs() < 1e-12);
        // Sets at 0.8: {0}, {0, 1}, {}
        assert_eq!(average_set_size(&observations, 0.8).unwrap(), 1.0);
        assert!((single_label_fraction(&observations, 0.8).unwrap() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_wrong_prediction_kind() {
        let o = Observation {
            label: 0.0,
            prediction: Prediction::Interval(crate::predictor::RegressionPrediction {
                point: 0.0,
                intervals: Vec::new(),
            }),
        };
        assert!(matches!(
            observed_fuzziness(&[o]),
            Err(ConformalError::EvaluationFailure(_))
        ));
    }
}
