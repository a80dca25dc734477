//! Fetch failures and their classification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse category of a fetch failure, used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// HTTP-style status in `[400, 500)`. Assumed non-transient.
    ClientError,
    /// HTTP-style status in `[500, 600)`.
    ServerError,
    /// Anything else (timeouts, connection failures, decoding).
    Other,
}

impl ErrorClass {
    /// Classify an HTTP-style status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientError => write!(f, "client_error"),
            Self::ServerError => write!(f, "server_error"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Error type for fetch operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Request error: {0}")]
    Request(String),
}

impl FetchError {
    /// Create an HTTP status error.
    pub fn http(status: u16, url: impl Into<String>) -> Self {
        Self::Http {
            status,
            url: url.into(),
        }
    }

    /// The HTTP-style status, if the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify this failure.
    pub fn class(&self) -> ErrorClass {
        self.status()
            .map(ErrorClass::from_status)
            .unwrap_or(ErrorClass::Other)
    }

    /// Whether this failure is a client error.
    pub fn is_client_error(&self) -> bool {
        self.class() == ErrorClass::ClientError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_from_status() {
        assert_eq!(ErrorClass::from_status(400), ErrorClass::ClientError);
        assert_eq!(ErrorClass::from_status(404), ErrorClass::ClientError);
        assert_eq!(ErrorClass::from_status(499), ErrorClass::ClientError);
        assert_eq!(ErrorClass::from_status(500), ErrorClass::ServerError);
        assert_eq!(ErrorClass::from_status(503), ErrorClass::ServerError);
        assert_eq!(ErrorClass::from_status(302), ErrorClass::Other);
        assert_eq!(ErrorClass::from_status(600), ErrorClass::Other);
    }

    #[test]
    fn test_fetch_error_class() {
        assert_eq!(FetchError::http(404, "/api/users/1").class(), ErrorClass::ClientError);
        assert_eq!(FetchError::http(500, "/api/users/1").class(), ErrorClass::ServerError);
        assert_eq!(FetchError::Timeout("slow".into()).class(), ErrorClass::Other);
        assert_eq!(FetchError::Connection("refused".into()).class(), ErrorClass::Other);
    }

    #[test]
    fn test_fetch_error_status() {
        assert_eq!(FetchError::http(418, "/tea").status(), Some(418));
        assert_eq!(FetchError::Request("bad".into()).status(), None);
        assert!(FetchError::http(422, "/form").is_client_error());
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::http(500, "/api/posts");
        assert_eq!(err.to_string(), "HTTP error: 500 for /api/posts");
    }

    #[test]
    fn test_error_class_display() {
        assert_eq!(ErrorClass::ClientError.to_string(), "client_error");
        assert_eq!(ErrorClass::ServerError.to_string(), "server_error");
    }
}
