//! Error types for Chastor
//!
//! The data-access layer never hands a driver error to its callers. Store
//! failures arrive here as `Database`, and the services re-raise them as
//! `Query` with the operation that failed.

use hyper::StatusCode;
use std::fmt;

/// The read operation a `Query` error belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Count,
    Fetch { slug: String },
    List,
    Audit,
    ListDatabases,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => write!(f, "Failed to get platforms count"),
            Self::Fetch { slug } => write!(f, "Failed to get platform with slug {slug}"),
            Self::List => write!(f, "Failed to get platforms"),
            Self::Audit => write!(f, "Failed to perform platform audit"),
            Self::ListDatabases => write!(f, "Failed to list databases"),
        }
    }
}

/// Main error type for Chastor operations
#[derive(Debug, thiserror::Error)]
pub enum ChastorError {
    /// Connection string for the selected target is missing or unusable.
    /// Raised on first use of the connection, never at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// Raw store failure, before the service attaches an operation
    #[error("Database error: {0}")]
    Database(String),

    #[error("{operation}: {message}")]
    Query { operation: Operation, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChastorError {
    /// Attach the failing operation to a store error.
    ///
    /// Configuration and connection failures keep their own variant so the
    /// caller can tell "not configured" apart from "query broke".
    pub fn during(self, operation: Operation) -> Self {
        match self {
            Self::Config(_) | Self::Connection(_) | Self::Query { .. } => self,
            other => Self::Query {
                operation,
                message: other.to_string(),
            },
        }
    }

    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Query { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show in an error panel
    pub fn public_message(&self) -> String {
        match self {
            Self::Query { operation, .. } => operation.to_string(),
            Self::Config(_) => "Database is not configured".to_string(),
            Self::Connection(_) => "Database is unreachable".to_string(),
            Self::Database(_) | Self::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for ChastorError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ChastorError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for ChastorError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for ChastorError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match err.kind.as_ref() {
            ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) | ErrorKind::DnsResolve { .. } => {
                Self::Connection(err.to_string())
            }
            ErrorKind::InvalidArgument { .. } => Self::Config(err.to_string()),
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<bson::de::Error> for ChastorError {
    fn from(err: bson::de::Error) -> Self {
        Self::Database(format!("Malformed document: {}", err))
    }
}

/// Result type alias for Chastor operations
pub type Result<T> = std::result::Result<T, ChastorError>;
