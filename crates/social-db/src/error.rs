//! Translation of backend failures into the store's error taxonomy.
//!
//! Classification keys off SQLite primary and extended result codes only.
//! The raw error is logged here and dropped; callers never see its text.

use rusqlite::ErrorCode;
use rusqlite::ffi;
use tracing::{error, warn};

use social_types::Error;

/// Error type used inside query closures: either a backend error still to
/// be classified, or an already-decided domain outcome.
#[derive(Debug)]
pub(crate) enum QueryError {
    Sqlite(rusqlite::Error),
    Domain(Error),
}

pub(crate) type QueryResult<T> = Result<T, QueryError>;

impl From<rusqlite::Error> for QueryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

impl From<Error> for QueryError {
    fn from(e: Error) -> Self {
        Self::Domain(e)
    }
}

impl QueryError {
    pub(crate) fn into_error(self) -> Error {
        match self {
            Self::Sqlite(e) => classify(e),
            Self::Domain(e) => e,
        }
    }
}

pub fn classify(err: rusqlite::Error) -> Error {
    if let rusqlite::Error::QueryReturnedNoRows = err {
        return Error::NotFound;
    }

    if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
        match failure.code {
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::OperationInterrupted
            | ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure => {
                warn!("Transient storage failure: {:?}", failure.code);
                return Error::StorageUnavailable;
            }
            _ => {}
        }
    }

    error!("Unclassified storage error: {}", err);
    Error::Storage
}

fn extended_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.extended_code),
        _ => None,
    }
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        extended_code(err),
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) | Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

pub(crate) fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    extended_code(err) == Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), Some("vendor text".into()))
    }

    #[test]
    fn busy_and_interrupt_are_transient() {
        assert_eq!(classify(failure(ffi::SQLITE_BUSY)), Error::StorageUnavailable);
        assert_eq!(classify(failure(ffi::SQLITE_INTERRUPT)), Error::StorageUnavailable);
    }

    #[test]
    fn no_rows_is_not_found() {
        assert_eq!(classify(rusqlite::Error::QueryReturnedNoRows), Error::NotFound);
    }

    #[test]
    fn constraint_codes_are_detected_structurally() {
        assert!(is_unique_violation(&failure(ffi::SQLITE_CONSTRAINT_UNIQUE)));
        assert!(!is_unique_violation(&failure(ffi::SQLITE_CONSTRAINT_FOREIGNKEY)));
        assert!(is_foreign_key_violation(&failure(ffi::SQLITE_CONSTRAINT_FOREIGNKEY)));
        assert_eq!(classify(failure(ffi::SQLITE_CONSTRAINT_CHECK)), Error::Storage);
    }
}
