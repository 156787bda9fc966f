//! Error types and utilities for database operations.
//!
//! See [`PgError`] for the main error type used throughout this crate.

use std::borrow::Cow;
use std::time::Duration;

pub use deadpool::managed::TimeoutType;
use diesel::ConnectionError;
use diesel::result::DatabaseErrorKind;
pub use diesel::result::{ConnectionError as DieselConnectionError, Error as DieselError};
pub use diesel_async::pooled_connection::PoolError as DieselPoolError;
pub use diesel_async::pooled_connection::deadpool::PoolError as DeadpoolError;

use crate::types::ConstraintViolation;

/// Type-erased error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Provides contextual hints for error types to aid in debugging and user messaging.
pub trait ErrorHint {
    /// Returns an additional hint for an error type.
    fn hint(&self) -> Cow<'static, str>;
}

impl ErrorHint for TimeoutType {
    fn hint(&self) -> Cow<'static, str> {
        match self {
            TimeoutType::Wait => Cow::Borrowed(
                "Connection pool is exhausted, consider increasing pool size or shortening transactions",
            ),
            TimeoutType::Create => Cow::Borrowed(
                "Unable to establish new database connection, check connection string and database availability",
            ),
            TimeoutType::Recycle => Cow::Borrowed(
                "Failed to recycle database connection, connection may be in invalid state",
            ),
        }
    }
}

/// Error type for all PostgreSQL database operations.
#[derive(Debug, thiserror::Error)]
#[must_use = "database errors should be handled appropriately"]
pub enum PgError {
    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pool operation timed out.
    ///
    /// This can occur during connection creation, waiting for available connections,
    /// or connection recycling operations.
    #[error("Database operation timed out")]
    Timeout(TimeoutType),

    /// Failed to establish or maintain a database connection.
    #[error("Database connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Applying or inspecting schema migrations failed.
    #[error("Database migration error: {0}")]
    Migration(BoxError),

    /// Query execution failed.
    ///
    /// This includes SQL syntax errors, constraint violations, type mismatches,
    /// and other query-related failures.
    #[error("Database query error: {0}")]
    Query(#[from] DieselError),

    /// An operation that requires an existing record found none.
    #[error("No {model} record found for {operation}")]
    NotFound {
        /// Model the operation targeted.
        model: &'static str,
        /// Operation that required the record.
        operation: &'static str,
    },

    /// Arguments were rejected before reaching the database.
    #[error("Invalid query arguments: {0}")]
    Validation(Cow<'static, str>),

    /// A transaction exceeded its configured time budget and was rolled back.
    #[error("Transaction exceeded its timeout of {0:?}")]
    TransactionTimeout(Duration),

    /// Unexpected error occurred.
    #[error("Unexpected error: {0}")]
    Unexpected(Cow<'static, str>),
}

impl PgError {
    /// Creates a [`PgError::NotFound`] for the given model and operation.
    pub fn not_found(model: &'static str, operation: &'static str) -> Self {
        Self::NotFound { model, operation }
    }

    /// Creates a [`PgError::Validation`] error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Validation(message.into())
    }

    /// Extracts the constraint name from a constraint violation error.
    pub fn constraint(&self) -> Option<&str> {
        let PgError::Query(DieselError::DatabaseError(_, info)) = self else {
            return None;
        };

        info.constraint_name()
    }

    /// Returns a structured constraint violation if this error represents a known one.
    pub fn constraint_violation(&self) -> Option<ConstraintViolation> {
        self.constraint().and_then(ConstraintViolation::new)
    }

    /// Returns whether the operation failed because its target record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PgError::NotFound { .. } | PgError::Query(DieselError::NotFound)
        )
    }

    /// Returns whether a unique constraint rejected the write.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            PgError::Query(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _
            ))
        )
    }

    /// Returns whether a foreign key constraint rejected the write.
    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(
            self,
            PgError::Query(DieselError::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation,
                _
            ))
        )
    }

    /// Returns whether this error indicates a transient failure that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PgError::Timeout(_)
                | PgError::TransactionTimeout(_)
                | PgError::Connection(ConnectionError::BadConnection(_))
                | PgError::Query(DieselError::DatabaseError(
                    DatabaseErrorKind::SerializationFailure,
                    _
                ))
        )
    }

    /// Returns whether this error indicates a permanent failure that won't succeed on retry.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

impl ErrorHint for PgError {
    fn hint(&self) -> Cow<'static, str> {
        match self {
            PgError::Timeout(timeout) => timeout.hint(),
            PgError::TransactionTimeout(_) => Cow::Borrowed(
                "Split the transaction into smaller units or raise its timeout",
            ),
            PgError::NotFound { .. } => {
                Cow::Borrowed("Check the unique selector or use the non-throwing variant")
            }
            PgError::Migration(_) => {
                Cow::Borrowed("Run `shopfloor migrate` and check the migration history table")
            }
            _ => match self.constraint_violation() {
                Some(violation) => Cow::Owned(format!(
                    "Constraint `{violation}` on table `{}` rejected the write",
                    violation.table_name()
                )),
                None => Cow::Borrowed("Inspect the database logs for details"),
            },
        }
    }
}

impl From<DeadpoolError> for PgError {
    fn from(value: DeadpoolError) -> Self {
        match value {
            DeadpoolError::Timeout(timeout) => Self::Timeout(timeout),
            DeadpoolError::Backend(DieselPoolError::QueryError(error)) => Self::Query(error),
            DeadpoolError::Backend(DieselPoolError::ConnectionError(error)) => {
                Self::Connection(error)
            }
            DeadpoolError::PostCreateHook(err) => {
                tracing::warn!("Unexpected post-create hook error: {}", err);
                Self::Unexpected(err.to_string().into())
            }
            DeadpoolError::NoRuntimeSpecified => {
                tracing::error!("No tokio runtime specified for connection pool");
                Self::Unexpected("No runtime specified".into())
            }
            DeadpoolError::Closed => Self::Connection(ConnectionError::InvalidConnectionUrl(
                "Connection pool is closed".into(),
            )),
        }
    }
}

/// Specialized [`Result`] type for database operations.
pub type PgResult<T, E = PgError> = Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_permanent() {
        let error = PgError::not_found("User", "find_unique_or_throw");
        assert!(error.is_not_found());
        assert!(error.is_permanent());
        assert_eq!(
            error.to_string(),
            "No User record found for find_unique_or_throw"
        );
    }

    #[test]
    fn timeouts_are_transient() {
        assert!(PgError::Timeout(TimeoutType::Wait).is_transient());
        assert!(PgError::TransactionTimeout(Duration::from_secs(5)).is_transient());
        assert!(!PgError::validation("bad").is_transient());
    }

    #[test]
    fn diesel_not_found_is_not_found() {
        assert!(PgError::Query(DieselError::NotFound).is_not_found());
        assert!(PgError::Query(DieselError::NotFound).constraint().is_none());
    }

    #[test]
    fn hints_cover_timeouts() {
        let hint = PgError::Timeout(TimeoutType::Wait).hint();
        assert!(hint.contains("pool"));
    }
}
