//! Error types for the storage engine.
//!
//! Two layers:
//!
//! - [`DbOpError`] is produced at the guarded-statement boundary. Raw
//!   `rusqlite`/`r2d2` errors are converted here and never escape in their
//!   original form.
//! - [`StoreError`] is the component-level taxonomy (init, operation,
//!   migration, liveness) used to decide whether the subsystem can continue.

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::database::DbState;
use crate::sqlite::DbSource;

/// A single storage operation failed.
#[derive(Debug, Error)]
pub enum DbOpError {
    /// `SQLite` reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No pooled connection could be checked out.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Filesystem error while preparing the database location.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The database is not accepting operations.
    #[error("database is {0}, not open")]
    NotOpen(DbState),

    /// A lost connection to this source cannot be replaced without losing
    /// its contents.
    #[error("cannot reopen {0}")]
    CannotReopen(DbSource),

    /// Data could not be written or read in the expected shape.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl DbOpError {
    /// Whether the failure was a constraint violation (duplicate key, missing
    /// foreign key target, NOT NULL).
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation
        )
    }
}

/// Component-level storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection or schema setup failed; the storage subsystem must not be
    /// enabled.
    #[error("database init failed: {message}")]
    Init {
        /// What was being set up.
        message: String,
        /// Underlying operation failure.
        #[source]
        source: DbOpError,
    },

    /// A single transaction or query failed.
    #[error("operation failed: {0}")]
    Operation(#[from] DbOpError),

    /// A patch or batch-copy step failed; later steps were not attempted.
    #[error("migration step `{step}` failed")]
    Migration {
        /// Patch name or table being copied.
        step: String,
        /// Underlying operation failure.
        #[source]
        source: DbOpError,
    },

    /// The liveness probe failed and the single reconnect attempt failed too.
    #[error("connection lost and reconnect failed")]
    Liveness {
        /// Reconnect failure.
        #[source]
        source: DbOpError,
    },
}

impl StoreError {
    /// Build an [`StoreError::Init`] from a message and cause.
    pub fn init(message: impl Into<String>, source: DbOpError) -> Self {
        Self::Init {
            message: message.into(),
            source,
        }
    }

    /// Build a [`StoreError::Migration`] for `step`.
    pub fn migration(step: impl Into<String>, source: DbOpError) -> Self {
        Self::Migration {
            step: step.into(),
            source,
        }
    }
}

/// Convenience alias for operation-level results.
pub type Result<T> = std::result::Result<T, DbOpError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint_error() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: ErrorCode::ConstraintViolation,
                extended_code: 2067,
            },
            Some("UNIQUE constraint failed".into()),
        )
    }

    #[test]
    fn sqlite_error_display() {
        let err = DbOpError::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.to_string().contains("sqlite error"));
    }

    #[test]
    fn not_open_display() {
        let err = DbOpError::NotOpen(DbState::Closed);
        assert_eq!(err.to_string(), "database is closed, not open");
    }

    #[test]
    fn detects_constraint_violation() {
        assert!(DbOpError::from(constraint_error()).is_constraint_violation());
        assert!(!DbOpError::from(rusqlite::Error::QueryReturnedNoRows).is_constraint_violation());
        assert!(!DbOpError::InvalidData("x".into()).is_constraint_violation());
    }

    #[test]
    fn cannot_reopen_names_source() {
        let err = DbOpError::CannotReopen(DbSource::Memory);
        assert_eq!(err.to_string(), "cannot reopen :memory:");
    }

    #[test]
    fn migration_error_names_step() {
        let err = StoreError::migration("geo_info_ip_removal", DbOpError::InvalidData("x".into()));
        assert_eq!(
            err.to_string(),
            "migration step `geo_info_ip_removal` failed"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn operation_from_db_op() {
        let err: StoreError = DbOpError::NotOpen(DbState::Closing).into();
        assert!(matches!(err, StoreError::Operation(_)));
    }
}
