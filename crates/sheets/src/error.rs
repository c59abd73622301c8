//! Error types for worksheet access.

use thiserror::Error;
use trailstop_core::MonitorError;

/// Errors that can occur while reading or writing a worksheet.
#[derive(Debug, Error)]
pub enum SheetsError {
    /// Credentials or settings are missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A range string is not valid A1 notation.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Building or exchanging the service-account assertion failed.
    #[error("authentication error: {0}")]
    Auth(String),

    /// API request returned a non-success status.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error body returned by the API.
        message: String,
    },

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Request timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Local file error (CSV backend).
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SheetsError {
    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Maps the error onto the monitor taxonomy for the given operation.
    ///
    /// Configuration problems stay fatal; everything else is a transport
    /// failure that abandons the current cycle.
    #[must_use]
    pub fn into_monitor(self, operation: &str) -> MonitorError {
        match self {
            Self::Configuration(msg) => MonitorError::Config(msg),
            other => MonitorError::transport(operation, other.to_string()),
        }
    }
}

impl From<reqwest::Error> for SheetsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SheetsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SheetsError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<csv::Error> for SheetsError {
    fn from(err: csv::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type alias for worksheet operations.
pub type Result<T> = std::result::Result<T, SheetsError>;
