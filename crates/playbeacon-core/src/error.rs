//! Error types for PlayBeacon Core

use thiserror::Error;

/// Result type alias for telemetry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Telemetry error types
///
/// None of these are fatal to the host: every failure path degrades to
/// incomplete telemetry, never to disrupted playback.
#[derive(Error, Debug)]
pub enum Error {
    // Integration errors
    #[error("Malformed load URI: {uri}")]
    InvalidUri {
        uri: String,
        source: url::ParseError,
    },

    #[error("Load URI has no host: {uri}")]
    MissingHost { uri: String },

    // Transport errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Collector responded with HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Beacon delivery abandoned after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Beacon delivery cancelled")]
    Cancelled,

    // Serialization errors
    #[error("Failed to serialize beacon: {0}")]
    Serialization(#[from] serde_json::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No tokio runtime available to run beacon delivery")]
    NoRuntime,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Returns true if a beacon that failed with this error is worth retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::HttpStatus { .. } | Error::Io(_)
        )
    }

    /// Returns the error code for diagnostics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidUri { .. } => "INVALID_URI",
            Error::MissingHost { .. } => "MISSING_HOST",
            Error::Network(_) => "NETWORK",
            Error::HttpStatus { .. } => "HTTP_STATUS",
            Error::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            Error::Cancelled => "CANCELLED",
            Error::Serialization(_) => "SERIALIZATION",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::NoRuntime => "NO_RUNTIME",
            Error::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::HttpStatus { status: 503 }.is_recoverable());
        assert!(!Error::Cancelled.is_recoverable());
        assert!(!Error::config("zero capacity").is_recoverable());
        assert!(!Error::RetriesExhausted { attempts: 5 }.is_recoverable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::MissingHost { uri: "x".into() }.error_code(), "MISSING_HOST");
        assert_eq!(Error::RetriesExhausted { attempts: 5 }.error_code(), "RETRIES_EXHAUSTED");
    }
}
