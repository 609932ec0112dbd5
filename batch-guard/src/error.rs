//! Error types for batch-guard.
//!
//! Validation failures are never errors: they are recorded in the
//! [`FailureRegistry`](crate::core::FailureRegistry). This enum only covers the
//! two other categories a run can hit:
//!
//! - **configuration errors**, a rule or config that cannot be evaluated at all
//!   (no table given to `unique`, a batch size of zero, ...);
//! - **backend errors**, anything the storage layer reports. These propagate
//!   unmodified and are never retried here.

use thiserror::Error;

/// The main error type for batch-guard.
#[derive(Error, Debug)]
pub enum BatchError {
    /// A rule or configuration value is unusable.
    #[error("Configuration error for '{rule}': {message}")]
    Configuration {
        /// Rule (or config key) the error refers to
        rule: String,
        /// Detailed error message
        message: String,
    },

    /// Error from DataFusion query execution.
    #[error("DataFusion error: {0}")]
    Backend(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations while reading query results.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// A `connection.table` prefix names a connection the store doesn't know.
    #[error("Connection '{0}' is not registered with the store")]
    ConnectionNotFound(String),

    /// Security-related error, e.g. a malformed table or column identifier.
    #[error("Security error: {0}")]
    SecurityError(String),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, BatchError>`.
pub type Result<T> = std::result::Result<T, BatchError>;

impl BatchError {
    /// Creates a new configuration error.
    pub fn configuration(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Creates the error raised when a rule is given fewer parameters than it needs.
    pub fn missing_parameter(rule: impl Into<String>, required: usize) -> Self {
        let rule = rule.into();
        let message = format!("Validation rule {rule} requires at least {required} parameter(s)");
        Self::Configuration { rule, message }
    }

    /// Returns true for errors raised by the storage layer.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            BatchError::Backend(_) | BatchError::Arrow(_) | BatchError::ConnectionNotFound(_)
        )
    }

    /// Returns true for rule or configuration mistakes.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BatchError::Configuration { .. } | BatchError::SecurityError(_)
        )
    }
}

impl From<serde_json::Error> for BatchError {
    fn from(err: serde_json::Error) -> Self {
        BatchError::Serialization(err.to_string())
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<BatchError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| match e.into() {
            BatchError::Internal(inner) => BatchError::Internal(format!("{msg}: {inner}")),
            other => BatchError::Internal(format!("{msg}: {other}")),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let msg = f();
            match e.into() {
                BatchError::Internal(inner) => BatchError::Internal(format!("{msg}: {inner}")),
                other => BatchError::Internal(format!("{msg}: {other}")),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameter_error() {
        let err = BatchError::missing_parameter("unique", 1);
        assert_eq!(
            err.to_string(),
            "Configuration error for 'unique': Validation rule unique requires at least 1 parameter(s)"
        );
        assert!(err.is_configuration());
        assert!(!err.is_backend());
    }

    #[test]
    fn test_backend_classification() {
        let err = BatchError::from(datafusion::error::DataFusionError::Plan(
            "table 'missing' not found".to_string(),
        ));
        assert!(err.is_backend());
        assert!(!err.is_configuration());

        assert!(BatchError::ConnectionNotFound("audit".to_string()).is_backend());
    }

    #[test]
    fn test_error_context() {
        fn failing_operation() -> Result<()> {
            Err(BatchError::Internal("lock poisoned".to_string()))
        }

        let err = failing_operation().context("During query logging").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Internal error: During query logging: lock poisoned"
        );
    }
}
