use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for the changelog-gen library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// Completion service returned a non-success status.
    #[error("Completion service returned HTTP {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        message: String,
    },

    /// Rate limit retries were exhausted for a batch.
    #[error("Rate limited after {attempts} attempts")]
    RateLimited {
        /// Number of attempts made before giving up
        attempts: usize,
    },

    /// Completion service response could not be interpreted.
    #[error("Malformed completion response: {message}")]
    MalformedResponse {
        /// Error message
        message: String,
    },

    /// Transport-level failure talking to the completion service.
    #[error("Transport error: {message}")]
    Transport {
        /// Error message
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an API error from a status code and response body.
    ///
    /// The body is truncated so one oversized error page cannot flood logs.
    #[must_use]
    pub fn api(status: u16, body: &str) -> Self {
        let mut message = body.trim().to_string();
        if message.len() > 500 {
            message.truncate(500);
        }
        Self::Api { status, message }
    }

    /// Creates a malformed response error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Returns true if this error is batch-local: the run can continue and the
    /// affected batch simply contributes no entries.
    #[must_use]
    pub const fn is_batch_local(&self) -> bool {
        matches!(
            self,
            Self::Api { .. }
                | Self::RateLimited { .. }
                | Self::MalformedResponse { .. }
                | Self::Transport { .. }
        )
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::config("test message");
        assert!(err.is_config());
        assert!(err.to_string().contains("test message"));
    }

    #[test]
    fn test_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io("/tmp/commits.txt", io_err);
        assert!(err.to_string().contains("/tmp/commits.txt"));
        assert!(!err.is_batch_local());
    }

    #[test]
    fn test_api_error_truncates_body() {
        let body = "x".repeat(2000);
        let err = Error::api(500, &body);
        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message.len(), 500);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_batch_local_classification() {
        assert!(Error::api(429, "slow down").is_batch_local());
        assert!(Error::RateLimited { attempts: 5 }.is_batch_local());
        assert!(Error::malformed("no choices").is_batch_local());
        assert!(!Error::config("bad").is_batch_local());
    }

    #[test]
    fn test_serialization_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().contains("Serialization error"));
    }
}
