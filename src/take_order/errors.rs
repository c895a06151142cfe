//! Fill-specific error types

use thiserror::Error;

/// Errors that can occur while taking an order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FillError {
    /// Surfaced by the trade executor; terminal for the fill attempt
    #[error("Trade execution failed ({code}): {message}")]
    Execution { code: i64, message: String },

    #[error("Position lookup failed: {0}")]
    Position(String),

    /// Residual order submission failed. Never returned from a top-level fill.
    #[error("Order placement failed: {0}")]
    Placement(String),

    #[error("Invalid trade request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Report serialization failed
    #[error("JSON error: {0}")]
    Json(String),
}

impl FillError {
    /// Build an execution error from an executor code and message
    pub fn execution(code: i64, message: impl Into<String>) -> Self {
        FillError::Execution {
            code,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for FillError {
    fn from(err: serde_json::Error) -> Self {
        FillError::Json(err.to_string())
    }
}

impl From<config::ConfigError> for FillError {
    fn from(err: config::ConfigError) -> Self {
        FillError::Config(err.to_string())
    }
}

/// Result type for fill operations
pub type FillResult<T> = std::result::Result<T, FillError>;
