//! Error types for the Estimator

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during estimation
///
/// Only `InvalidInput` and `Config` escape the public API. The others are
/// raised by individual model, search and store calls and are absorbed by
/// the pipeline, which falls through to the next stage.
#[derive(Error, Debug)]
pub enum EstimatorError {
    /// Caller supplied a malformed context
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration rejected by validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// A model, search or store call exceeded its budget
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// Model output could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// Retrieval backend error
    #[error("Search error: {0}")]
    Search(String),

    /// Learned-rule store error
    #[error("Store error: {0}")]
    Store(String),
}

impl From<serde_json::Error> for EstimatorError {
    fn from(e: serde_json::Error) -> Self {
        EstimatorError::Parse(e.to_string())
    }
}
