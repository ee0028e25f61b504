//! Error types shared by the storage engine and the computation graph.

use thiserror::Error;

/// Result type alias for quiver operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for quiver operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A node referenced a column that no define, data source or dataset provides.
    #[error("unknown column: {column}")]
    ColumnNotFound { column: String },
    /// A define or alias tried to reuse an existing column name.
    #[error("column already exists: {column}")]
    DuplicateColumn { column: String },
    /// A field or column name breaks the naming rules.
    #[error("invalid name: {message}")]
    InvalidName { message: String },
    /// The statically requested type differs from the column's declared type.
    #[error("type mismatch for column {column}: requested {expected}, column holds {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },
    /// Graph or storage configuration that cannot be honoured.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
    /// An action was asked to run its lifecycle a second time.
    #[error("action {action} has already run")]
    AlreadyRun { action: String },
    /// A capability the accumulator or backend does not provide.
    #[error("unsupported: {message}")]
    Unsupported { message: String },
    /// The event loop that should have produced a result failed.
    #[error("result unavailable: {message}")]
    ResultUnavailable { message: String },
    /// A runtime value does not fit the field it is written to.
    #[error("invalid value for field {field}: {message}")]
    InvalidValue { field: String, message: String },
    /// Structurally invalid on-disk data.
    #[error("corrupt {what}: {message}")]
    Corrupt { what: String, message: String },
    /// Codec failure.
    #[error("compression error: {message}")]
    Compression { message: String },
    /// A write failed earlier and the dataset was abandoned.
    #[error("dataset aborted: {message}")]
    Aborted { message: String },
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a column not found error.
    pub fn column_not_found(column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            column: column.into(),
        }
    }

    /// Creates a duplicate column error.
    pub fn duplicate_column(column: impl Into<String>) -> Self {
        Error::DuplicateColumn {
            column: column.into(),
        }
    }

    /// Creates an invalid name error.
    pub fn invalid_name(message: impl Into<String>) -> Self {
        Error::InvalidName {
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(
        column: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Error::TypeMismatch {
            column: column.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an already-run error.
    pub fn already_run(action: impl Into<String>) -> Self {
        Error::AlreadyRun {
            action: action.into(),
        }
    }

    /// Creates an unsupported error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported {
            message: message.into(),
        }
    }

    /// Creates a result-unavailable error.
    pub fn result_unavailable(message: impl Into<String>) -> Self {
        Error::ResultUnavailable {
            message: message.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupt(what: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Corrupt {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Creates a compression error.
    pub fn compression(message: impl Into<String>) -> Self {
        Error::Compression {
            message: message.into(),
        }
    }

    /// Creates an aborted error.
    pub fn aborted(message: impl Into<String>) -> Self {
        Error::Aborted {
            message: message.into(),
        }
    }

    /// Returns true for errors raised while wiring the graph, before any entry is read.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::ColumnNotFound { .. }
                | Error::DuplicateColumn { .. }
                | Error::InvalidName { .. }
                | Error::TypeMismatch { .. }
                | Error::InvalidOperation { .. }
                | Error::AlreadyRun { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::type_mismatch("pt", "f32", "f64");
        assert_eq!(
            err.to_string(),
            "type mismatch for column pt: requested f32, column holds f64"
        );

        let err = Error::column_not_found("eta");
        assert_eq!(err.to_string(), "unknown column: eta");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::duplicate_column("x").is_configuration());
        assert!(Error::invalid_operation("range under threads").is_configuration());
        assert!(!Error::corrupt("footer", "bad checksum").is_configuration());
    }
}
