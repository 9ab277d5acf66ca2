use crate::algorithm::{Algorithm, Params, Regressor};
use crate::constants::{DEFAULT_BETA, MIN_RESIDUAL};
use crate::data::{FeatureVector, Record};
use crate::errors::ConformalError;
use crate::predictor::result::Interval;
use crate::utils::{items_to_strings, parse_param};
use log::warn;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Prefix that routes a parameter to the error model.
pub const ERROR_MODEL_PREFIX: &str = "error.";

/// Nonconformity formulas for regression.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum RegressionNcmKind {
    /// `|y - y_hat|`
    AbsoluteDifference,
    /// `|y - y_hat| / (exp(sigma_hat) + beta)`, the error model predicts `ln |residual|`.
    Normalized { beta: f64 },
    /// `|y - y_hat| / (max(sigma_hat, 0) + beta)`, the error model predicts `|residual|`.
    Variance { beta: f64 },
}

impl RegressionNcmKind {
    pub fn requires_error_model(&self) -> bool {
        !matches!(self, RegressionNcmKind::AbsoluteDifference)
    }

    pub fn beta(&self) -> Option<f64> {
        match self {
            RegressionNcmKind::AbsoluteDifference => None,
            RegressionNcmKind::Normalized { beta } | RegressionNcmKind::Variance { beta } => Some(*beta),
        }
    }

    fn with_beta(self, value: f64) -> Result<Self, ConformalError> {
        let check = |min_exclusive: bool| {
            if value.is_nan() || value < 0.0 || (min_exclusive && value == 0.0) {
                Err(ConformalError::InvalidParameter(
                    "beta".to_string(),
                    if min_exclusive { "positive value" } else { "non-negative value" }.to_string(),
                    value.to_string(),
                ))
            } else {
                Ok(())
            }
        };
        match self {
            RegressionNcmKind::AbsoluteDifference => Err(ConformalError::UnknownParameter(
                "beta".to_string(),
                "AbsoluteDifference".to_string(),
            )),
            RegressionNcmKind::Normalized { .. } => {
                check(false)?;
                Ok(RegressionNcmKind::Normalized { beta: value })
            }
            // max(sigma, 0) can be zero, so beta keeps the scale away from zero
            RegressionNcmKind::Variance { .. } => {
                check(true)?;
                Ok(RegressionNcmKind::Variance { beta: value })
            }
        }
    }
}

impl FromStr for RegressionNcmKind {
    type Err = ConformalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AbsoluteDifference" => Ok(RegressionNcmKind::AbsoluteDifference),
            "Normalized" => Ok(RegressionNcmKind::Normalized { beta: DEFAULT_BETA }),
            "Variance" => Ok(RegressionNcmKind::Variance { beta: DEFAULT_BETA }),
            _ => Err(ConformalError::ParseString(
                s.to_string(),
                "RegressionNcmKind".to_string(),
                items_to_strings(vec!["AbsoluteDifference", "Normalized", "Variance"]),
            )),
        }
    }
}

/// Regression nonconformity measure: a point model plus, for the normalized
/// kinds, an error model estimating how difficult each record is.
#[derive(Clone, Debug)]
pub struct RegressionNcm {
    kind: RegressionNcmKind,
    model: Box<dyn Regressor>,
    error_model: Option<Box<dyn Regressor>>,
}

impl RegressionNcm {
    pub fn new(
        kind: RegressionNcmKind,
        model: Box<dyn Regressor>,
        error_model: Option<Box<dyn Regressor>>,
    ) -> Result<Self, ConformalError> {
        let error_model = match (kind.requires_error_model(), error_model) {
            (true, None) => {
                return Err(ConformalError::InvalidParameter(
                    "error_model".to_string(),
                    "a regressor".to_string(),
                    "none".to_string(),
                ))
            }
            (false, Some(_)) => {
                warn!("Error model is ignored by the AbsoluteDifference nonconformity measure.");
                None
            }
            (_, error_model) => error_model,
        };
        if let RegressionNcmKind::Variance { beta } | RegressionNcmKind::Normalized { beta } = kind {
            kind.with_beta(beta)?;
        }
        Ok(RegressionNcm {
            kind,
            model,
            error_model,
        })
    }

    pub fn kind(&self) -> RegressionNcmKind {
        self.kind
    }

    pub fn requires_error_model(&self) -> bool {
        self.kind.requires_error_model()
    }

    pub fn model(&self) -> &dyn Regressor {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> &mut dyn Regressor {
        self.model.as_mut()
    }

    pub fn error_model(&self) -> Option<&dyn Regressor> {
        self.error_model.as_deref()
    }

    pub fn error_model_mut(&mut self) -> Option<&mut (dyn Regressor + 'static)> {
        self.error_model.as_deref_mut()
    }

    /// Model parameters, then `beta`, then error model parameters prefixed with `error.`.
    pub fn params(&self) -> Params {
        let mut params = self.model.params();
        if let Some(beta) = self.kind.beta() {
            params.insert("beta".to_string(), beta.to_string());
        }
        if let Some(err) = &self.error_model {
            for (k, v) in err.params() {
                params.insert(format!("{}{}", ERROR_MODEL_PREFIX, k), v);
            }
        }
        params
    }

    pub fn set_param(&mut self, name: &str, value: &str) -> Result<(), ConformalError> {
        if name == "beta" {
            self.kind = self.kind.with_beta(parse_param(name, value, "real value")?)?;
            return Ok(());
        }
        if let Some(inner) = name.strip_prefix(ERROR_MODEL_PREFIX) {
            return match self.error_model.as_mut() {
                Some(err) => err.set_param(inner, value),
                None => Err(ConformalError::UnknownParameter(
                    name.to_string(),
                    "a nonconformity measure without error model".to_string(),
                )),
            };
        }
        self.model.set_param(name, value)
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_fitted() && self.error_model.as_ref().map_or(true, |e| e.is_fitted())
    }

    /// Train the point model, then the error model on the in-sample residuals.
    pub fn fit(&mut self, records: &[Record]) -> Result<(), ConformalError> {
        self.model.fit(records)?;
        if let Some(err) = self.error_model.as_mut() {
            let mut targets = Vec::with_capacity(records.len());
            for r in records {
                let residual = (r.label - self.model.predict(&r.features)?).abs();
                let target = match self.kind {
                    RegressionNcmKind::Normalized { .. } => residual.max(MIN_RESIDUAL).ln(),
                    _ => residual,
                };
                targets.push(Record::new(r.features.clone(), target));
            }
            err.fit(&targets)?;
        }
        Ok(())
    }

    /// Point prediction and the scale the residual is divided by.
    pub fn predict(&self, features: &FeatureVector) -> Result<(f64, f64), ConformalError> {
        let y_hat = self.model.predict(features)?;
        let scale = match (self.kind, self.error_model.as_ref()) {
            (RegressionNcmKind::Normalized { beta }, Some(err)) => err.predict(features)?.exp() + beta,
            (RegressionNcmKind::Variance { beta }, Some(err)) => err.predict(features)?.max(0.0) + beta,
            _ => 1.0,
        };
        Ok((y_hat, scale))
    }

    /// Nonconformity score of `features` with label `y`.
    pub fn score(&self, features: &FeatureVector, y: f64) -> Result<f64, ConformalError> {
        let (y_hat, scale) = self.predict(features)?;
        Ok((y - y_hat).abs() / scale)
    }

    /// Invert the score: every label whose score is at most `alpha`.
    pub fn interval(y_hat: f64, scale: f64, alpha: f64) -> Interval {
        Interval::new(y_hat - alpha * scale, y_hat + alpha * scale)
    }
}
