//! Error types for the duckgate process.
//!
//! Request-level failures are [`crate::server::ApiError`]; this type covers
//! startup, configuration and serving, where the only outcome is a log line
//! and a non-zero exit code.

use duckgate_engine::EngineError;
use thiserror::Error;

/// Result type alias for duckgate operations
pub type Result<T> = std::result::Result<T, DuckgateError>;

#[derive(Error, Debug)]
pub enum DuckgateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Server error: {0}")]
    Server(String),
}

impl DuckgateError {
    /// Shorthand for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        DuckgateError::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_convert() {
        let err: DuckgateError = EngineError::StoreUnavailable.into();
        assert!(matches!(err, DuckgateError::Engine(_)));
        assert_eq!(err.to_string(), "Engine error: Table store is unavailable");
    }

    #[test]
    fn test_config_message() {
        let err = DuckgateError::config("port must be non-zero");
        assert_eq!(err.to_string(), "Configuration error: port must be non-zero");
    }
}
