//! Error types for centinela
//!
//! One error enum covers model loading, adapter merging, generation and
//! request validation. Request-path errors map onto HTTP status codes via
//! [`CentinelaError::status_code`].

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for centinela operations
pub type Result<T> = std::result::Result<T, CentinelaError>;

/// Error type for all centinela operations
#[derive(Debug, Error)]
pub enum CentinelaError {
    /// Filesystem or network I/O failed
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the failed operation
        message: String,
    },

    /// Base model could not be resolved or built
    #[error("Failed to load model '{model}': {reason}")]
    ModelLoad {
        /// Base model identifier or path
        model: String,
        /// Underlying cause
        reason: String,
    },

    /// Adapter config or weights are unusable
    #[error("Adapter error: {0}")]
    AdapterError(String),

    /// Tokenizer failed to load, encode or decode
    #[error("Tokenizer error: {0}")]
    TokenizerError(String),

    /// Tensor runtime failure during generation
    #[error("Tensor runtime error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Generation failed for a reason other than the tensor runtime
    #[error("Inference error: {0}")]
    InferenceError(String),

    /// Process configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Request failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Generation exceeded its time budget
    #[error("Generation timed out after {seconds}s")]
    Timeout {
        /// Configured budget in seconds
        seconds: u64,
    },

    /// Server-side failure (bind, serve, worker join)
    #[error("Server error: {0}")]
    ServerError(String),
}

impl CentinelaError {
    /// HTTP status for this error when it surfaces from a request handler
    ///
    /// Validation failures are client errors; every other failure is reported
    /// as a server error with no transient/permanent distinction.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for CentinelaError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            message: err.to_string(),
        }
    }
}
