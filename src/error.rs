//! Error types and handling for Fuelwatch
//!
//! This module defines the error types used throughout the application.
//! The update cycle never lets these escape a tick; they are logged and the
//! scheduler moves on.

use thiserror::Error;

/// Result type alias for Fuelwatch operations
pub type Result<T> = std::result::Result<T, FuelWatchError>;

/// Distinguishes failures reported by the price source itself from
/// transport or decoding surprises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailureKind {
    /// The source answered with an error status or error body
    Source,
    /// Transport, timeout or decode failure
    Unexpected,
}

impl std::fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Unexpected => f.write_str("unexpected"),
        }
    }
}

/// Main error type for Fuelwatch
#[derive(Debug, Error)]
pub enum FuelWatchError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The price source could not produce a snapshot
    #[error("Source fetch error ({kind}): {message}")]
    SourceFetch {
        kind: FetchFailureKind,
        message: String,
    },

    /// The time-series sink rejected or could not accept a batch
    #[error("Sink write error: {message}")]
    SinkWrite { message: String },

    /// Reading back from the time-series sink failed
    #[error("Sink query error: {message}")]
    SinkQuery { message: String },

    /// A single best-effort publish failed
    #[error("Publish error: {message}")]
    Publish { message: String },

    /// Cadence expression could not be evaluated
    #[error("Schedule error: {message}")]
    Schedule { message: String },

    /// Monitored stations could not be re-read
    #[error("Config reload error: {message}")]
    ConfigReload { message: String },

    /// Station/settings store errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// HTTP/Web server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl FuelWatchError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a source-level fetch error (the API told us no)
    pub fn source_fetch<S: Into<String>>(message: S) -> Self {
        Self::SourceFetch {
            kind: FetchFailureKind::Source,
            message: message.into(),
        }
    }

    /// Create an unexpected fetch error (transport, decode)
    pub fn unexpected_fetch<S: Into<String>>(message: S) -> Self {
        Self::SourceFetch {
            kind: FetchFailureKind::Unexpected,
            message: message.into(),
        }
    }

    /// Create a new sink write error
    pub fn sink_write<S: Into<String>>(message: S) -> Self {
        Self::SinkWrite {
            message: message.into(),
        }
    }

    /// Create a new sink query error
    pub fn sink_query<S: Into<String>>(message: S) -> Self {
        Self::SinkQuery {
            message: message.into(),
        }
    }

    /// Create a new publish error
    pub fn publish<S: Into<String>>(message: S) -> Self {
        Self::Publish {
            message: message.into(),
        }
    }

    /// Create a new schedule error
    pub fn schedule<S: Into<String>>(message: S) -> Self {
        Self::Schedule {
            message: message.into(),
        }
    }

    /// Create a new config reload error
    pub fn config_reload<S: Into<String>>(message: S) -> Self {
        Self::ConfigReload {
            message: message.into(),
        }
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        Self::Web {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>, M: Into<String>>(field: S, message: M) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Fetch failure tag, if this is a source fetch error
    pub fn fetch_kind(&self) -> Option<FetchFailureKind> {
        match self {
            Self::SourceFetch { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FuelWatchError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for FuelWatchError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for FuelWatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for FuelWatchError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}

impl From<rusqlite::Error> for FuelWatchError {
    fn from(err: rusqlite::Error) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<cron::error::Error> for FuelWatchError {
    fn from(err: cron::error::Error) -> Self {
        Self::schedule(err.to_string())
    }
}

impl From<chrono::ParseError> for FuelWatchError {
    fn from(err: chrono::ParseError) -> Self {
        Self::validation("datetime", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = FuelWatchError::config("test config error");
        assert!(matches!(err, FuelWatchError::Config { .. }));

        let err = FuelWatchError::sink_write("influx down");
        assert!(matches!(err, FuelWatchError::SinkWrite { .. }));

        let err = FuelWatchError::validation("field", "test validation error");
        assert!(matches!(err, FuelWatchError::Validation { .. }));
    }

    #[test]
    fn test_fetch_kind_tagging() {
        let known = FuelWatchError::source_fetch("HTTP 503");
        assert_eq!(known.fetch_kind(), Some(FetchFailureKind::Source));

        let surprise = FuelWatchError::unexpected_fetch("eof while parsing");
        assert_eq!(surprise.fetch_kind(), Some(FetchFailureKind::Unexpected));

        assert_eq!(FuelWatchError::publish("x").fetch_kind(), None);
    }

    #[test]
    fn test_error_display() {
        let err = FuelWatchError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = FuelWatchError::validation("test_field", "invalid value");
        assert_eq!(
            format!("{}", err),
            "Validation error: test_field - invalid value"
        );

        let err = FuelWatchError::source_fetch("HTTP 500");
        assert_eq!(format!("{}", err), "Source fetch error (source): HTTP 500");
    }
}
