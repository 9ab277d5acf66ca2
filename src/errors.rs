//! Errors
//!
//! Custom error types used throughout the `conformal` crate.
use thiserror::Error;

/// Errors that can occur while training, predicting with, tuning or persisting
/// a conformal predictor.
#[derive(Debug, Error)]
pub enum ConformalError {
    /// Malformed data, e.g. a non-integral class label or an empty calibration set.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Prediction was requested before the predictor was trained.
    #[error("The {0} has not been trained.")]
    UntrainedPredictor(String),
    /// Training was requested on an instance that is already calibrated.
    #[error("The {0} is already trained, create a new instance to retrain.")]
    AlreadyTrained(String),
    /// Decryption produced content that does not match the recorded checksums.
    #[error("Unable to decrypt the model, the key does not match the one it was encrypted with.")]
    KeyMismatch,
    /// Stored content does not match its recorded checksum.
    #[error("Checksum mismatch for '{entry}': expected {expected}, got {actual}.")]
    ChecksumMismatch {
        entry: String,
        expected: String,
        actual: String,
    },
    /// Members that cannot be merged into one aggregated predictor.
    #[error("Unable to aggregate models: {0}")]
    AggregationMismatch(String),
    /// Training or evaluation of a single grid point failed.
    #[error("Evaluation failed: {0}")]
    EvaluationFailure(String),
    /// Every grid point failed or was invalid.
    #[error(
        "Grid search failed, none of the {n_points} parameter combinations produced a valid result: {}",
        .messages.join("; ")
    )]
    GridSearchFailed { n_points: usize, messages: Vec<String> },
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// A parameter name not recognised by the component it was passed to.
    #[error("Unknown parameter {0} for {1}.")]
    UnknownParameter(String, String),
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// The operation is not supported by this component.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// Unable to write model to file.
    #[error("Unable to write model: {0}")]
    UnableToWrite(String),
    /// Unable to read model from file.
    #[error("Unable to read model: {0}")]
    UnableToRead(String),
}
