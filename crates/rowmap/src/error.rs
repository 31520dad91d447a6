//! Error types for rowmap

use crate::mapping::OpKind;
use crate::result::ExecResult;
use thiserror::Error;

/// Result type alias for rowmap operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for mapping and statement operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// The query produced no rows for a fetch.
    ///
    /// Carries the result (statement text and arguments) with its not-found flag set.
    #[error("Not found: {}", .0.sql())]
    NotFound(Box<ExecResult>),

    /// The destination or record argument cannot be used for this operation
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// The INSERT/UPDATE head cannot be analyzed
    #[error("Malformed {op} head {head:?}: {reason}")]
    MalformedStatementHead {
        op: OpKind,
        head: String,
        reason: String,
    },

    /// A scanned value could not be stored in its destination field
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Arguments do not fit the statement
    #[error("Validation error: {0}")]
    Validation(String),

    /// Query execution error reported by tokio-postgres
    #[cfg(feature = "postgres")]
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Execution error reported by any other executor
    #[error("Driver error: {0}")]
    Driver(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a not found error for the given result
    pub fn not_found(result: ExecResult) -> Self {
        Self::NotFound(Box::new(result.into_not_found()))
    }

    /// Create an invalid destination error
    pub fn invalid_destination(message: impl Into<String>) -> Self {
        Self::InvalidDestination(message.into())
    }

    /// Create a malformed head error
    pub fn malformed_head(op: OpKind, head: &str, reason: impl Into<String>) -> Self {
        Self::MalformedStatementHead {
            op,
            head: head.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wrap an executor error without reinterpreting it
    pub fn driver(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Driver(Box::new(err))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is an invalid destination error
    pub fn is_invalid_destination(&self) -> bool {
        matches!(self, Self::InvalidDestination(_))
    }

    /// Check if this is a malformed head error
    pub fn is_malformed_head(&self) -> bool {
        matches!(self, Self::MalformedStatementHead { .. })
    }

    /// The result attached to a not found error
    pub fn not_found_result(&self) -> Option<&ExecResult> {
        match self {
            Self::NotFound(result) => Some(result),
            _ => None,
        }
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

/// Convert a not found error into `Ok(None)`.
pub trait OptionalExt<T> {
    fn optional(self) -> OrmResult<Option<T>>;
}

impl<T> OptionalExt<T> for OrmResult<T> {
    fn optional(self) -> OrmResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(OrmError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
