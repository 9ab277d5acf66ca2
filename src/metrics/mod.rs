//! Metrics
//!
//! Efficiency and validity metrics for conformal predictions: set-based
//! metrics for p-values, width metrics for intervals and proper scoring rules
//! for Venn-ABERS probabilities.
pub mod classification;
pub mod evaluation;
pub mod probabilistic;
pub mod regression;

pub use evaluation::{coverage, Metric, Observation};
