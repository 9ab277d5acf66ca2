//! Tuning
//!
//! Grid search over predictor parameters with cross-validated evaluation.
//!
//! # Submodules
//!
//! * `grid`: Ordered parameter grids and their points.
//! * `testing`: K-fold, leave-one-out and single train/test splits.
//! * `runner`: Trains copies of a predictor per split and collects observations.
//! * `search`: Evaluates and ranks every grid point.

pub mod grid;
pub mod runner;
pub mod search;
pub mod testing;

pub use grid::{GridPoint, ParameterGrid};
pub use runner::TestRunner;
pub use search::{GridSearch, GridSearchResult, GsResult, GsStatus};
pub use testing::{TestSplit, TestingStrategy};
