//! Store error classification.

use thiserror::Error;

/// Coarse classification of a `sqlx::Error` into the behavioral kinds the
/// rest of the engine cares about: is this something a caller might retry,
/// or a bug/lock contention worth surfacing distinctly?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDbErrorKind {
    /// `SQLITE_BUSY` / `SQLITE_LOCKED` - another writer holds the lock.
    BusyOrLocked,
    /// A `CHECK`/`UNIQUE`/`FOREIGN KEY` constraint rejected the write.
    ConstraintViolation,
    /// Connection pool timed out acquiring a connection.
    PoolTimeout,
    /// Connection pool has been closed.
    PoolClosed,
    /// sqlx decode/protocol error - schema drift or a driver bug.
    Protocol,
    /// Any other I/O failure talking to the database file.
    Io,
    /// Everything else.
    Other,
}

impl StoreDbErrorKind {
    #[must_use]
    pub fn classify(err: &sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "5" | "6" => return Self::BusyOrLocked, // SQLITE_BUSY / SQLITE_LOCKED
                        "19" => return Self::ConstraintViolation, // SQLITE_CONSTRAINT
                        _ => {}
                    }
                }
                if db_err.is_unique_violation() || db_err.is_check_violation() {
                    Self::ConstraintViolation
                } else {
                    Self::Other
                }
            }
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Protocol(_) | sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Protocol
            }
            _ => Self::Other,
        }
    }
}

/// Errors surfaced by every [`crate::Store`] operation.
///
/// `NotFound` is deliberately its own variant, distinct from `Database` -
/// callers (the retry controller in particular) branch on it to decide
/// between "abandon silently" and "count as a transient failure".
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("row not found: {0}")]
    NotFound(i64),

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("store database error ({kind:?}): {source}")]
    Database {
        kind: StoreDbErrorKind,
        #[source]
        source: sqlx::Error,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            // Callers that can name the id use `StoreError::NotFound` directly;
            // this fallback only fires for queries with no id context to attach.
            return Self::Database { kind: StoreDbErrorKind::Other, source: err };
        }
        let kind = StoreDbErrorKind::classify(&err);
        Self::Database { kind, source: err }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_not_found_display() {
        let err = StoreError::NotFound(42);
        assert_eq!(err.to_string(), "row not found: 42");
    }

    #[test]
    fn test_store_error_group_not_found_display() {
        let err = StoreError::GroupNotFound("g1".to_string());
        assert_eq!(err.to_string(), "group not found: g1");
    }
}
