//! Error types for the crane replay environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The classifier could not be reached or rejected the request
    #[error("Classifier error: {0}")]
    ClassifierFailed(String),

    /// The classifier answered with something that is not a JSON document
    #[error("Malformed classifier response: {0}")]
    MalformedResponse(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a classifier error.
    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::ClassifierFailed(msg.into())
    }

    /// Creates a malformed-response error.
    pub fn malformed(msg: impl std::fmt::Display) -> Self {
        Self::MalformedResponse(msg.to_string())
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed(err)
    }
}
