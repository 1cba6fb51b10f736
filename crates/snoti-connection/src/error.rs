//! Connection error types.

use thiserror::Error;

/// Connection error type.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// TCP connect failed
    #[error("Failed to dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS configuration or handshake error
    #[error("TLS error: {0}")]
    Tls(String),

    /// Broker host is not a valid TLS server name
    #[error("Invalid TLS server name: {0}")]
    InvalidServerName(String),

    /// Broker refused the login
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Login reply was not a login response
    #[error("Invalid login response: {0}")]
    LoginResponse(#[from] serde_json::Error),

    /// A step did not finish in time
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// Broker closed the stream
    #[error("Connection closed by broker")]
    Closed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings failed validation
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

/// Result type alias using ConnectionError.
pub type ConnectionResult<T> = Result<T, ConnectionError>;
