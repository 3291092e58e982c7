// ⚠️ Error Types - every failure path returns a typed result
//
// Validation and conflicts are the caller's problem and are never retried.
// Storage failures may be transient (busy / locked database) and are the
// only kind a fetch step is allowed to retry.

use crate::validation::ValidationError;
use thiserror::Error;

/// Result type alias for dues operations.
pub type Result<T> = std::result::Result<T, DuesError>;

#[derive(Debug, Error)]
pub enum DuesError {
    /// Malformed input (negative amount, month out of range, empty name...)
    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    /// Referential inconsistency (payment for a missing or inactive member)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Lookup miss
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// SQLite failure
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// CSV roster import failure
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding of audit payloads
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DuesError {
    /// Single-field validation failure
    pub fn invalid(field: &str, message: impl Into<String>, context: &str) -> Self {
        DuesError::Validation(vec![ValidationError::new(field, message, context)])
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DuesError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DuesError::Validation(_))
    }

    /// True for I/O failures worth another attempt.
    ///
    /// Only SQLite busy/locked errors qualify; everything else is either a
    /// caller mistake or a permanent storage problem.
    pub fn is_retryable(&self) -> bool {
        match self {
            DuesError::Storage(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_joins_fields() {
        let error = DuesError::Validation(vec![
            ValidationError::new("name", "Required field is empty", "Member"),
            ValidationError::new("monthly_due", "Must not be negative", "Member"),
        ]);

        assert_eq!(
            error.to_string(),
            "validation failed: [Member] name: Required field is empty; [Member] monthly_due: Must not be negative"
        );
        assert!(error.is_validation());
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_not_found_display() {
        let error = DuesError::not_found("payment", 42);
        assert_eq!(error.to_string(), "payment 42 not found");
    }

    #[test]
    fn test_busy_database_is_retryable() {
        let busy = DuesError::Storage(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(busy.is_retryable());

        let conflict = DuesError::Conflict("member 3 is inactive".to_string());
        assert!(!conflict.is_retryable());
    }
}
