//! Calibration Module
//!
//! Turns nonconformity scores into calibrated outputs.
//!
//! # Submodules
//!
//! * `scores`: Sorted calibration scores and the p-value / interval quantile calculator.
//! * `isotonic`: Isotonic regression used by the Venn-ABERS predictor.

pub mod isotonic;
pub mod scores;

pub use isotonic::IsotonicCalibrator;
pub use scores::CalibrationScores;
