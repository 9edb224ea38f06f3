//! Error types for the identypo library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`IdentypoError`] enum. Structural failures (malformed input files, an
//! untrained model, mismatched feature widths) are surfaced as errors;
//! per-typo failures such as an empty candidate set are not errors and are
//! reported as empty suggestion lists instead.

use std::io;

use thiserror::Error;

/// The main error type for identypo operations.
#[derive(Error, Debug)]
pub enum IdentypoError {
    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed vocabulary, frequency, record, or candidate-cache files.
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// Suggest/rank called before the ranker was trained or loaded.
    #[error("Model not trained: {0}")]
    ModelNotTrained(String),

    /// Feature or embedding width differs from the width the model was
    /// built with.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Corrupt or incompatible persisted model files.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Invalid configuration values.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error.
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with IdentypoError.
pub type Result<T> = std::result::Result<T, IdentypoError>;

impl IdentypoError {
    /// Create a new data format error.
    pub fn data_format<S: Into<String>>(msg: S) -> Self {
        IdentypoError::DataFormat(msg.into())
    }

    /// Create a new model-not-trained error.
    pub fn not_trained<S: Into<String>>(msg: S) -> Self {
        IdentypoError::ModelNotTrained(msg.into())
    }

    /// Create a new dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        IdentypoError::DimensionMismatch { expected, actual }
    }

    /// Create a new persistence error.
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        IdentypoError::Persistence(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        IdentypoError::InvalidConfig(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        IdentypoError::Other(msg.into())
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        IdentypoError::Other(format!("Internal error: {}", msg.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = IdentypoError::data_format("bad frequency line");
        assert_eq!(error.to_string(), "Data format error: bad frequency line");

        let error = IdentypoError::not_trained("call train() first");
        assert_eq!(error.to_string(), "Model not trained: call train() first");

        let error = IdentypoError::dimension_mismatch(8, 5);
        assert_eq!(error.to_string(), "Dimension mismatch: expected 8, got 5");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let identypo_error = IdentypoError::from(io_error);

        match identypo_error {
            IdentypoError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }
}
