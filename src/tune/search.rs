use crate::constants::MAX_ERROR_MESSAGES;
use crate::data::Dataset;
use crate::errors::ConformalError;
use crate::metrics::{coverage, Metric, Observation};
use crate::predictor::Predictor;
use crate::tune::grid::{GridPoint, ParameterGrid};
use crate::tune::runner::TestRunner;
use crate::tune::testing::TestingStrategy;
use crate::utils::{validate_confidence, validate_float_parameter};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::{Duration, Instant};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum GsStatus {
    /// Evaluated and, when a tolerance is set, valid.
    Valid,
    /// Observed coverage fell more than the tolerance below the confidence.
    Invalid,
    /// The predictor rejected a parameter value.
    InvalidParams,
    /// Training, prediction or metric computation failed.
    Failed,
}

/// Outcome of one grid point.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GsResult {
    pub point: GridPoint,
    pub status: GsStatus,
    /// Value of the optimised metric.
    pub score: Option<f64>,
    pub secondary: Vec<(Metric, f64)>,
    /// Observed coverage at the search confidence, absent for probability outputs.
    pub coverage: Option<f64>,
    pub runtime: Duration,
    pub error: Option<String>,
}

/// Evaluated grid points, best first.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GridSearchResult {
    pub metric: Metric,
    pub confidence: f64,
    pub results: Vec<GsResult>,
}

impl GridSearchResult {
    /// Best valid point.
    pub fn best(&self) -> Option<&GsResult> {
        self.results.first().filter(|r| r.status == GsStatus::Valid)
    }

    pub fn valid(&self) -> impl Iterator<Item = &GsResult> {
        self.results.iter().filter(|r| r.status == GsStatus::Valid)
    }
}

/// Exhaustive search over a [`ParameterGrid`], ranking points by one metric.
#[derive(Clone, Debug)]
pub struct GridSearch {
    runner: TestRunner,
    metric: Option<Metric>,
    secondary: Vec<Metric>,
    tolerance: Option<f64>,
}

impl GridSearch {
    pub fn new(strategy: TestingStrategy, confidence: f64) -> Result<Self, ConformalError> {
        Ok(GridSearch {
            runner: TestRunner::new(strategy, confidence)?,
            metric: None,
            secondary: Vec::new(),
            tolerance: None,
        })
    }

    /// Metric to optimise, defaults to the one suited to the predictor.
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn with_secondary_metrics(mut self, metrics: Vec<Metric>) -> Self {
        self.secondary = metrics;
        self
    }

    /// Mark points whose coverage is below `confidence - tolerance` as invalid.
    pub fn with_tolerance(mut self, tolerance: f64) -> Result<Self, ConformalError> {
        validate_float_parameter(tolerance, 0.0, 1.0, "tolerance")?;
        self.tolerance = Some(tolerance);
        Ok(self)
    }

    pub fn confidence(&self) -> f64 {
        self.runner.confidence()
    }

    /// Evaluate every grid point on copies of `template`.
    ///
    /// Failures of single points are recorded in their [`GsResult`]; an error
    /// is returned only when no point is valid.
    pub fn search(
        &self,
        template: &Predictor,
        data: &Dataset,
        grid: &ParameterGrid,
    ) -> Result<GridSearchResult, ConformalError> {
        validate_confidence(self.confidence())?;
        if template.is_trained() {
            return Err(ConformalError::AlreadyTrained(format!(
                "{:?} predictor used as a grid search template",
                template.kind()
            )));
        }
        let metric = self
            .metric
            .unwrap_or_else(|| Metric::default_for(template.kind(), template.task()));
        let points = grid.points();
        info!("Evaluating {} grid points, optimising {:?}.", points.len(), metric);

        let mut results: Vec<GsResult> = points
            .into_par_iter()
            .map(|point| self.evaluate_point(template, data, point, metric))
            .collect();

        let maximize = metric.maximize();
        // sort_by is stable, so ties keep grid order
        results.sort_by(|a, b| {
            a.status.cmp(&b.status).then_with(|| match a.status {
                GsStatus::Valid | GsStatus::Invalid => compare_scores(a.score, b.score, maximize),
                GsStatus::InvalidParams | GsStatus::Failed => Ordering::Equal,
            })
        });

        if results.iter().all(|r| r.status != GsStatus::Valid) {
            let mut messages: Vec<String> = Vec::new();
            for r in &results {
                if let Some(e) = &r.error {
                    if !messages.contains(e) && messages.len() < MAX_ERROR_MESSAGES {
                        messages.push(e.clone());
                    }
                }
            }
            return Err(ConformalError::GridSearchFailed {
                n_points: results.len(),
                messages,
            });
        }
        Ok(GridSearchResult {
            metric,
            confidence: self.confidence(),
            results,
        })
    }

    fn evaluate_point(&self, template: &Predictor, data: &Dataset, point: GridPoint, metric: Metric) -> GsResult {
        let start = Instant::now();
        let mut result = GsResult {
            point,
            status: GsStatus::Failed,
            score: None,
            secondary: Vec::new(),
            coverage: None,
            runtime: Duration::ZERO,
            error: None,
        };

        let mut predictor = template.clone();
        if let Err(e) = predictor.set_params(&result.point.params()) {
            warn!("Grid point {} rejected: {}", result.point, e);
            result.status = GsStatus::InvalidParams;
            result.error = Some(e.to_string());
            result.runtime = start.elapsed();
            return result;
        }

        match self.score_point(&predictor, data, metric) {
            Ok((score, secondary, observed)) => {
                result.score = Some(score);
                result.secondary = secondary;
                result.coverage = observed;
                let required = self.tolerance.map(|t| self.confidence() - t);
                result.status = match (observed, required) {
                    (Some(c), Some(r)) if c < r => {
                        result.error = Some(format!("coverage {:.4} is below the required {:.4}", c, r));
                        GsStatus::Invalid
                    }
                    _ => GsStatus::Valid,
                };
            }
            Err(e) => {
                warn!("Grid point {} failed: {}", result.point, e);
                result.error = Some(e.to_string());
            }
        }
        result.runtime = start.elapsed();
        result
    }

    #[allow(clippy::type_complexity)]
    fn score_point(
        &self,
        predictor: &Predictor,
        data: &Dataset,
        metric: Metric,
    ) -> Result<(f64, Vec<(Metric, f64)>, Option<f64>), ConformalError> {
        let confidence = self.confidence();
        let observations: Vec<Observation> = self.runner.evaluate(predictor, data)?;
        let score = metric.calculate(&observations, confidence)?;
        let secondary = self
            .secondary
            .iter()
            .map(|m| Ok((*m, m.calculate(&observations, confidence)?)))
            .collect::<Result<_, ConformalError>>()?;
        Ok((score, secondary, coverage(&observations, confidence)?))
    }
}

/// Best score first, NaN and missing scores last.
fn compare_scores(a: Option<f64>, b: Option<f64>, maximize: bool) -> Ordering {
    let a = a.filter(|v| !v.is_nan());
    let b = b.filter(|v| !v.is_nan());
    match (a, b) {
        (Some(a), Some(b)) => {
            if maximize {
                b.total_cmp(&a)
            } else {
                a.total_cmp(&b)
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{Algorithm, KnnClassifier, KnnRegressor, Params, Regressor};
    use crate::data::{FeatureVector, Record};
    use crate::utils::parse_param;
    use crate::ncm::{ClassificationNcm, ClassificationNcmKind, Ncm, RegressionNcm, RegressionNcmKind};
    use crate::testing::{make_classification, make_regression};

    fn regression_icp() -> Predictor {
        let ncm = Ncm::Regression(
            RegressionNcm::new(
                RegressionNcmKind::Normalized { beta: 0.1 },
                Box::new(KnnRegressor::default()),
                Some(Box::new(KnnRegressor::new(10, false))),
            )
            .unwrap(),
        );
        Predictor::icp(ncm, 0.25, 3).unwrap()
    }

    /// Predicts the training mean, and refuses to fit fewer than `min_records` records.
    #[derive(Clone, Debug)]
    struct MeanRegressor {
        min_records: usize,
        scale: f64,
        mean: Option<f64>,
    }

    impl Algorithm for MeanRegressor {
        fn name(&self) -> &'static str {
            "MeanRegressor"
        }

        fn params(&self) -> Params {
            Params::from([
                ("min_records".to_string(), self.min_records.to_string()),
                ("scale".to_string(), self.scale.to_string()),
            ])
        }

        fn set_param(&mut self, name: &str, value: &str) -> Result<(), ConformalError> {
            match name {
                "min_records" => {
                    let n: usize = parse_param(name, value, "positive integer")?;
                    if n == 0 {
                        return Err(ConformalError::InvalidParameter(
                            name.to_string(),
                            "positive integer".to_string(),
                            value.to_string(),
                        ));
                    }
                    self.min_records = n;
                }
                "scale" => self.scale = parse_param(name, value, "real value")?,
                _ => return Err(ConformalError::UnknownParameter(name.to_string(), self.name().to_string())),
            }
            Ok(())
        }

        fn is_fitted(&self) -> bool {
            self.mean.is_some()
        }

        fn state(&self) -> Result<Vec<u8>, ConformalError> {
            serde_json::to_vec(&self.mean).map_err(|e| ConformalError::UnableToWrite(e.to_string()))
        }

        fn restore(&mut self, state: &[u8]) -> Result<(), ConformalError> {
            self.mean = serde_json::from_slice(state).map_err(|e| ConformalError::UnableToRead(e.to_string()))?;
            Ok(())
        }
    }

    impl Regressor for MeanRegressor {
        fn fit(&mut self, records: &[Record]) -> Result<(), ConformalError> {
            if records.len() < self.min_records {
                return Err(ConformalError::InvalidInput(format!(
                    "fit needs at least {} records",
                    self.min_records
                )));
            }
            let sum: f64 = records.iter().map(|r| r.label).sum();
            self.mean = Some(self.scale * sum / records.len() as f64);
            Ok(())
        }

        fn predict(&self, _features: &FeatureVector) -> Result<f64, ConformalError> {
            self.mean
                .ok_or_else(|| ConformalError::UntrainedPredictor("MeanRegressor".to_string()))
        }

        fn clone_box(&self) -> Box<dyn Regressor> {
            Box::new(self.clone())
        }
    }

    fn mean_icp() -> Predictor {
        let model = MeanRegressor {
            min_records: 1,
            scale: 1.0,
            mean: None,
        };
        let ncm =
            Ncm::Regression(RegressionNcm::new(RegressionNcmKind::AbsoluteDifference, Box::new(model), None).unwrap());
        Predictor::icp(ncm, 0.25, 3).unwrap()
    }

    fn kfold() -> TestingStrategy {
        TestingStrategy::KFold {
            folds: 3,
            stratified: false,
            seed: 3,
        }
    }

    #[test]
    fn test_ranking_and_statuses() {
        let data = make_regression(90, 3);
        let grid = ParameterGrid::new()
            .add("k", &["1", "5", "0", "15"])
            .unwrap()
            .add("beta", &["0.1"])
            .unwrap();
        let search = GridSearch::new(kfold(), 0.8)
            .unwrap()
            .with_metric(Metric::MeanIntervalWidth)
            .with_secondary_metrics(vec![Metric::RootMeanSquaredError]);
        let result = search.search(&regression_icp(), &data, &grid).unwrap();
        assert_eq!(result.results.len(), 4);
        let valid: Vec<&GsResult> = result.valid().collect();
        assert_eq!(valid.len(), 3);
        assert!(valid.windows(2).all(|w| w[0].score <= w[1].score));
        let last = &result.results[3];
        assert_eq!(last.status, GsStatus::InvalidParams);
        assert_eq!(last.point.get("k"), Some("0"));
        assert!(last.error.is_some());
        let best = result.best().unwrap();
        assert_eq!(best.secondary.len(), 1);
        assert!(best.coverage.is_some());
    }

    #[test]
    fn test_single_valid_point_ranks_first() {
        let data = make_classification(60, 8);
        let ncm = Ncm::Classification(
            ClassificationNcm::new(ClassificationNcmKind::Margin, Box::new(KnnClassifier::default())).unwrap(),
        );
        let template = Predictor::icp(ncm, 0.3, 8).unwrap();
        let grid = ParameterGrid::new().add("k", &["nine", "7", "-1"]).unwrap();
        let search = GridSearch::new(kfold(), 0.8).unwrap();
        let result = search.search(&template, &data, &grid).unwrap();
        assert_eq!(result.metric, Metric::ObservedFuzziness);
        let best = result.best().unwrap();
        assert_eq!(best.point.get("k"), Some("7"));
        assert_eq!(result.valid().count(), 1);
        // Rejected points keep grid order
        assert_eq!(result.results[1].point.get("k"), Some("nine"));
        assert_eq!(result.results[2].point.get("k"), Some("-1"));
    }

    #[test]
    fn test_all_points_fail() {
        let data = make_regression(30, 1);
        let grid = ParameterGrid::new()
            .add("k", &["0", "x"])
            .unwrap()
            .add("unknown", &["1"])
            .unwrap();
        let err = GridSearch::new(kfold(), 0.8)
            .unwrap()
            .search(&regression_icp(), &data, &grid)
            .unwrap_err();
        match err {
            ConformalError::GridSearchFailed { n_points, messages } => {
                assert_eq!(n_points, 2);
                assert_eq!(messages.len(), 2);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_all_points_fail_in_training() {
        let data = make_regression(60, 2);
        let grid = ParameterGrid::new()
            .add("min_records", &["500", "1000"])
            .unwrap()
            .add("scale", &["1", "2"])
            .unwrap();
        let err = GridSearch::new(kfold(), 0.8)
            .unwrap()
            .search(&mean_icp(), &data, &grid)
            .unwrap_err();
        match err {
            ConformalError::GridSearchFailed { n_points, messages } => {
                assert_eq!(n_points, 4);
                // Both scales fail with the same message
                assert_eq!(messages.len(), 2, "{:?}", messages);
                assert!(messages.iter().any(|m| m.contains("at least 500 records")), "{:?}", messages);
                assert!(messages.iter().any(|m| m.contains("at least 1000 records")), "{:?}", messages);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_failed_points_rank_last() {
        let data = make_regression(60, 2);
        let grid = ParameterGrid::new().add("min_records", &["1000", "0", "1"]).unwrap();
        let result = GridSearch::new(kfold(), 0.8)
            .unwrap()
            .search(&mean_icp(), &data, &grid)
            .unwrap();
        let statuses: Vec<GsStatus> = result.results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![GsStatus::Valid, GsStatus::InvalidParams, GsStatus::Failed]);
        assert_eq!(result.best().unwrap().point.get("min_records"), Some("1"));
        assert!(result.best().unwrap().score.is_some());

        let failed = &result.results[2];
        assert_eq!(failed.point.get("min_records"), Some("1000"));
        assert!(failed.score.is_none());
        assert!(failed.error.as_deref().unwrap().contains("at least 1000 records"));
        assert!(result.results[1].error.is_some());
    }

    #[test]
    fn test_tolerance_marks_invalid() {
        // Calibration-exclusive records are predicted exactly, so every interval collapses to its point.
        let far = || Record::new(FeatureVector::from_dense(&[1000.0, 1000.0]).unwrap(), 0.0);
        let data = make_regression(60, 5)
            .with_calibration_exclusive((0..200).map(|_| far()).collect())
            .with_modeling_exclusive((0..10).map(|_| far()).collect());
        let ncm = Ncm::Regression(
            RegressionNcm::new(
                RegressionNcmKind::AbsoluteDifference,
                Box::new(KnnRegressor::default()),
                None,
            )
            .unwrap(),
        );
        let template = Predictor::icp(ncm, 0.25, 5).unwrap();
        let grid = ParameterGrid::new().add("k", &["5"]).unwrap();
        let err = GridSearch::new(kfold(), 0.8)
            .unwrap()
            .with_tolerance(0.1)
            .unwrap()
            .search(&template, &data, &grid)
            .unwrap_err();
        match err {
            ConformalError::GridSearchFailed { n_points, messages } => {
                assert_eq!(n_points, 1);
                assert!(messages[0].contains("coverage"), "{:?}", messages);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_compare_scores() {
        assert_eq!(compare_scores(Some(1.0), Some(2.0), false), Ordering::Less);
        assert_eq!(compare_scores(Some(1.0), Some(2.0), true), Ordering::Greater);
        assert_eq!(compare_scores(Some(f64::NAN), Some(2.0), true), Ordering::Greater);
        assert_eq!(compare_scores(None, None, true), Ordering::Equal);
    }
}
