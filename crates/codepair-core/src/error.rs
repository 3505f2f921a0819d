//! Error types for codepair

use thiserror::Error;

/// Main error type for codepair configuration and setup
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using codepair's Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid value error
    pub fn invalid_value(field: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidValue {
            field,
            message: message.into(),
        }
    }
}
