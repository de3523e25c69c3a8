//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod audit;
pub mod conversation;
pub mod message;
pub mod pool;

use chrono::{DateTime, SecondsFormat, Utc};
use parley_types::error::RepositoryError;

/// Fixed-width RFC 3339 with microseconds and a `Z` suffix, so that string
/// comparison in SQL matches time order.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn parse_optional_datetime(
    s: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    s.as_deref().map(parse_datetime).transpose()
}

/// Classify a sqlx error.
///
/// Lock contention (`SQLITE_BUSY`, `SQLITE_LOCKED`, pool timeouts) is a
/// retryable conflict; a dead pool or I/O failure is a connection error.
pub(crate) fn query_err(e: sqlx::Error) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db_err) => {
            let primary_code = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            if matches!(primary_code, Some(5) | Some(6)) {
                RepositoryError::Conflict(db_err.message().to_string())
            } else {
                RepositoryError::Query(e.to_string())
            }
        }
        sqlx::Error::PoolTimedOut => RepositoryError::Conflict(e.to_string()),
        sqlx::Error::PoolClosed | sqlx::Error::Io(_) => RepositoryError::Connection,
        _ => RepositoryError::Query(e.to_string()),
    }
}
