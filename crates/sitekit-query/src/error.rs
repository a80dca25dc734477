//! Query errors.

use sitekit_data::{ErrorClass, FetchError};

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Failures surfaced by the query cache.
///
/// The cache itself never fails on misses or expiry; every variant except
/// `TypeMismatch` originates from the caller-supplied fetch operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Client error (4xx). Not retried.
    #[error("client error fetching {key}: {source}")]
    Client {
        key: String,
        #[source]
        source: FetchError,
    },

    /// Any other failure, surfaced after retries were exhausted.
    #[error("fetching {key} failed after {attempts} attempts: {source}")]
    Transient {
        key: String,
        attempts: u32,
        #[source]
        source: FetchError,
    },

    /// The cached value for a key has a different type than requested.
    #[error("cached value for {key} is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

impl QueryError {
    /// Build the error for a fetch that is not retried further.
    pub(crate) fn from_fetch(key: &str, attempts: u32, source: FetchError) -> Self {
        match source.class() {
            ErrorClass::ClientError => Self::Client {
                key: key.to_string(),
                source,
            },
            _ => Self::Transient {
                key: key.to_string(),
                attempts,
                source,
            },
        }
    }

    /// Classification of the underlying fetch failure.
    pub fn class(&self) -> Option<ErrorClass> {
        self.fetch_error().map(FetchError::class)
    }

    /// The underlying fetch failure.
    pub fn fetch_error(&self) -> Option<&FetchError> {
        match self {
            Self::Client { source, .. } | Self::Transient { source, .. } => Some(source),
            Self::TypeMismatch { .. } => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Client { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
