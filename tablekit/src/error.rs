use std::time::Duration;

use crate::config::ConfigError;

/// Errors that can occur in the data layer.
#[derive(Debug)]
pub enum DataError {
    /// Malformed or ambiguous caller input (null parameter shapes, zero or
    /// several upsert keys, zero page sizes, ...).
    InvalidArgument(String),
    /// The resource being created already exists.
    Conflict(String),
    /// `commit` / `rollback` was called without an open transaction.
    NoTransaction,
    /// The database handle (or its pool) has been disposed.
    Closed,
    /// The statement did not complete within the configured command timeout.
    Timeout(Duration),
    /// A row or scalar could not be converted into the requested type.
    Decode(String),
    /// Configuration could not be loaded.
    Config(ConfigError),
    /// Failure reported by the SQL execution primitive, passed through unchanged.
    Database {
        operation: Option<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl DataError {
    /// Construct a `Database` variant from any error type.
    ///
    /// Used by backend crates (e.g. `tablekit-sqlx`) to wrap driver-specific errors.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Database {
            operation: None,
            source: Box::new(err),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        DataError::InvalidArgument(msg.into())
    }

    /// Attach the logical operation that was running when an upstream failure occurred.
    ///
    /// Only `Database` errors are annotated, and an operation recorded closer to
    /// the failure is never overwritten.
    pub fn in_operation(self, op: &str) -> Self {
        match self {
            DataError::Database {
                operation: None,
                source,
            } => DataError::Database {
                operation: Some(op.to_string()),
                source,
            },
            other => other,
        }
    }

    /// The logical operation attached to an upstream failure, if any.
    pub fn operation(&self) -> Option<&str> {
        match self {
            DataError::Database { operation, .. } => operation.as_deref(),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            DataError::Conflict(msg) => write!(f, "Already exists: {msg}"),
            DataError::NoTransaction => write!(f, "No active transaction"),
            DataError::Closed => write!(f, "Database handle is closed"),
            DataError::Timeout(after) => write!(f, "Command timed out after {after:?}"),
            DataError::Decode(msg) => write!(f, "Decode error: {msg}"),
            DataError::Config(err) => write!(f, "{err}"),
            DataError::Database {
                operation: Some(op),
                source,
            } => write!(f, "Database error in {op}: {source}"),
            DataError::Database {
                operation: None,
                source,
            } => write!(f, "Database error: {source}"),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Database { source, .. } => Some(source.as_ref()),
            DataError::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for DataError {
    fn from(err: ConfigError) -> Self {
        DataError::Config(err)
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Decode(err.to_string())
    }
}

/// Convenience alias for data-layer results.
pub type DataResult<T> = Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for Boom {}

    #[test]
    fn operation_is_attached_once() {
        let err = DataError::database(Boom)
            .in_operation("insert")
            .in_operation("outer");
        assert_eq!(err.operation(), Some("insert"));
        assert_eq!(err.to_string(), "Database error in insert: boom");
    }

    #[test]
    fn non_database_errors_are_not_annotated() {
        let err = DataError::invalid("page must be >= 1").in_operation("page");
        assert!(err.operation().is_none());
        assert!(err.to_string().contains("page must be >= 1"));
    }

    #[test]
    fn source_is_preserved() {
        use std::error::Error;
        let err = DataError::database(Boom);
        assert_eq!(err.source().map(|e| e.to_string()), Some("boom".into()));
    }
}
