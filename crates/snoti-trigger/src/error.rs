//! Error types for the trigger.

use thiserror::Error;

/// Trigger error type.
#[derive(Error, Debug)]
pub enum TriggerError {
    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two handlers registered under one name
    #[error("Handler already registered: {0}")]
    DuplicateHandler(String),

    /// IO error (config file, log file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Broker connection could not be set up
    #[error("Connection error: {0}")]
    Connection(#[from] snoti_connection::ConnectionError),
}

/// Result type for trigger operations.
pub type TriggerResult<T> = Result<T, TriggerError>;
