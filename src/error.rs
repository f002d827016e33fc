//! Error types for qas-gate

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by qas-gate
///
/// Per-PR and per-repository failures inside a batch are not raised with this
/// type; they are captured as [`ErrorKind`](crate::types::ErrorKind) on the
/// item's result record. `Error` is reserved for failures of a single remote
/// call and for operations that cannot start at all.
#[derive(Debug, Error)]
pub enum Error {
    /// Azure DevOps answered with a non-success status
    #[error("Azure DevOps API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or summary
        message: String,
    },

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Missing or rejected credentials
    #[error("authentication error: {0}")]
    Auth(String),

    /// Webhook delivery failed
    #[error("notification error: {0}")]
    Notification(String),

    /// A repository argument matched neither an id nor an alias
    #[error("unknown repository: {0}")]
    UnknownRepository(String),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file parse failure
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a read that failed with this error is worth retrying
    ///
    /// Rate limiting, server errors and connection problems are transient;
    /// client errors (bad id, missing permission) are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let throttled = Error::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        let unavailable = Error::Api {
            status: 503,
            message: "unavailable".to_string(),
        };
        let not_found = Error::Api {
            status: 404,
            message: "no such repository".to_string(),
        };

        assert!(throttled.is_transient());
        assert!(unavailable.is_transient());
        assert!(!not_found.is_transient());
        assert!(!Error::Config("bad".to_string()).is_transient());
    }

    #[test]
    fn test_api_error_display() {
        let err = Error::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "Azure DevOps API error (401): unauthorized");
    }
}
