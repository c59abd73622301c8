//! Error taxonomy for the position monitor.
//!
//! Every failure is scoped to the smallest unit it affects:
//!
//! - `Config` is fatal and only raised at startup.
//! - `Transport` and `Timeout` abandon the current cycle; the loop retries
//!   after the idle interval.
//! - `DataQuality` and `Action` are scoped to one ticker; the rest of the
//!   cycle proceeds and the ticker's persisted state is left untouched.

use thiserror::Error;

/// Errors raised by the monitor and its collaborators.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Required credentials or settings are missing.
    #[error("configuration error: {0}")]
    Config(String),

    /// A broker or persistence call failed.
    #[error("transport error during {operation}: {message}")]
    Transport {
        /// The collaborator call that failed (e.g. "list_open_positions").
        operation: String,
        /// Underlying failure description.
        message: String,
    },

    /// A collaborator call did not complete within its deadline.
    #[error("{operation} timed out after {secs}s")]
    Timeout {
        /// The collaborator call that timed out.
        operation: String,
        /// Deadline that elapsed.
        secs: u64,
    },

    /// Price or cost data for a ticker cannot be used this cycle.
    #[error("unusable data for {ticker}: {reason}")]
    DataQuality {
        /// Affected ticker.
        ticker: String,
        /// Why the data was rejected.
        reason: String,
    },

    /// A close command for a ticker failed.
    #[error("close failed for {ticker}: {message}")]
    Action {
        /// Affected ticker.
        ticker: String,
        /// Failure reported by the broker.
        message: String,
    },
}

impl MonitorError {
    /// Creates a transport error.
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    /// Creates a data quality error.
    pub fn data_quality(ticker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataQuality {
            ticker: ticker.into(),
            reason: reason.into(),
        }
    }

    /// Creates an action error.
    pub fn action(ticker: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Action {
            ticker: ticker.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error abandons the whole cycle.
    #[must_use]
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    /// Returns true if the error only affects a single ticker.
    #[must_use]
    pub fn is_ticker_scoped(&self) -> bool {
        matches!(self, Self::DataQuality { .. } | Self::Action { .. })
    }
}

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
