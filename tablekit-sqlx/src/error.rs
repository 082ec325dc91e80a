use tablekit::DataError;

/// Extension trait for converting `sqlx::Error` into `DataError`.
///
/// Due to Rust's orphan rules, we can't implement `From<sqlx::Error> for DataError`
/// in this crate. Instead, use `.into_data_error()`.
pub trait SqlxErrorExt {
    fn into_data_error(self) -> DataError;
}

impl SqlxErrorExt for sqlx::Error {
    fn into_data_error(self) -> DataError {
        match &self {
            sqlx::Error::PoolClosed => DataError::Closed,
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. } => DataError::Decode(self.to_string()),
            _ => DataError::database(self),
        }
    }
}

/// Convenience alias for data-layer results using `DataError`.
pub type SqlxResult<T> = Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_closed_is_closed() {
        assert!(matches!(
            sqlx::Error::PoolClosed.into_data_error(),
            DataError::Closed
        ));
    }

    #[test]
    fn missing_column_is_decode() {
        let err = sqlx::Error::ColumnNotFound("city".into()).into_data_error();
        assert!(matches!(err, DataError::Decode(ref m) if m.contains("city")));
    }

    #[test]
    fn other_errors_pass_through() {
        let err = sqlx::Error::Protocol("bad packet".into()).into_data_error();
        assert!(matches!(err, DataError::Database { operation: None, .. }));
        assert!(err.to_string().contains("bad packet"));
    }
}
