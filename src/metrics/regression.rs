use crate::errors::ConformalError;
use crate::metrics::evaluation::{EvaluationMetric, Observation};
use crate::predictor::result::RegressionPrediction;
use crate::predictor::Prediction;
use crate::utils::median;

fn regression(o: &Observation) -> Result<&RegressionPrediction, ConformalError> {
    match &o.prediction {
        Prediction::Interval(r) => Ok(r),
        _ => Err(ConformalError::EvaluationFailure(
            "regression metrics need interval predictions".to_string(),
        )),
    }
}

/// Widths of the intervals at `confidence`. Unbounded intervals have infinite width.
fn widths(observations: &[Observation], confidence: f64) -> Result<Vec<f64>, ConformalError> {
    observations
        .iter()
        .map(|o| {
            regression(o)?
                .at(confidence)
                .map(|ci| ci.interval.width())
                .ok_or_else(|| {
                    ConformalError::EvaluationFailure(format!("no interval predicted at confidence {}", confidence))
                })
        })
        .collect()
}

pub struct MeanIntervalWidthMetric {}
impl EvaluationMetric for MeanIntervalWidthMetric {
    fn calculate_metric(observations: &[Observation], confidence: f64) -> Result<f64, ConformalError> {
        let w = widths(observations, confidence)?;
        Ok(w.iter().sum::<f64>() / w.len() as f64)
    }
    fn maximize() -> bool {
        false
    }
}

pub struct MedianIntervalWidthMetric {}
impl EvaluationMetric for MedianIntervalWidthMetric {
    fn calculate_metric(observations: &[Observation], confidence: f64) -> Result<f64, ConformalError> {
        Ok(median(&widths(observations, confidence)?))
    }
    fn maximize() -> bool {
        false
    }
}

pub struct RootMeanSquaredErrorMetric {}
impl EvaluationMetric for RootMeanSquaredErrorMetric {
    fn calculate_metric(observations: &[Observation], _confidence: f64) -> Result<f64, ConformalError> {
        let y: Vec<f64> = observations.iter().map(|o| o.label).collect();
        let yhat: Vec<f64> = observations
            .iter()
            .map(|o| Ok(regression(o)?.point))
            .collect::<Result<_, ConformalError>>()?;
        Ok(root_mean_squared_error(&y, &yhat, &vec![1.0; y.len()]))
    }
    fn maximize() -> bool {
        false
    }
}

pub fn root_mean_squared_error(y: &[f64], yhat: &[f64], sample_weight: &[f64]) -> f64 {
    let mut w_sum = 0.;
    let res = y
        .iter()
        .zip(yhat)
        .zip(sample_weight)
        .map(|((y_, yhat_), w_)| {
            w_sum += *w_;
            (y_ - yhat_).powi(2) * *w_
        })
        .sum::<f64>();
    (res / w_sum).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::{ConfidenceInterval, Interval};

    fn obs(label: f64, point: f64, half: f64) -> Observation {
        let interval = Interval::new(point - half, point + half);
        Observation {
            label,
            prediction: Prediction::Interval(RegressionPrediction {
                point,
                intervals: vec![ConfidenceInterval {
                    confidence: 0.8,
                    interval,
                    capped: interval,
                }],
            }),
        }
    }

    #[test]
    fn test_root_mean_squared_error() {
        let y = vec![1., 3., 4., 5., 2., 4., 6.];
        let yhat = vec![3., 2., 3., 4., 4., 4., 4.];
        let sample_weight = vec![1., 1., 1., 1., 1., 2., 2.];
        let res = root_mean_squared_error(&y, &yhat, &sample_weight);
        assert!((res - 1.452966).abs() < 1e-6, "{}", res);
    }

    #[test]
    fn test_interval_widths() {
        let observations = vec![obs(1.0, 1.0, 1.0), obs(2.0, 0.0, 2.0), obs(0.0, 0.0, 6.0)];
        assert_eq!(MeanIntervalWidthMetric::calculate_metric(&observations, 0.8).unwrap(), 6.0);
        assert_eq!(MedianIntervalWidthMetric::calculate_metric(&observations, 0.8).unwrap(), 4.0);
        assert!(MeanIntervalWidthMetric::calculate_metric(&observations, 0.9).is_err());
        let rmse = RootMeanSquaredErrorMetric::calculate_metric(&observations, 0.8).unwrap();
        assert!((rmse - (4.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
