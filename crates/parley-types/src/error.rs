use thiserror::Error;

/// Errors from repository operations (used by trait definitions in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    /// The row exists but its current state refuses the write.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Errors returned by every messaging operation.
///
/// `NotFound` and `Forbidden` never reveal whether a resource the caller
/// cannot see exists: lookups outside the caller's scope report `NotFound`.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("access denied")]
    Forbidden,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transaction-level failure on a concurrent write; safe to retry.
    #[error("concurrent write conflict: {0}")]
    ConflictOrRace(String),

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),
}

impl MessagingError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        MessagingError::InvalidArgument(msg.into())
    }

    /// Only write conflicts are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MessagingError::ConflictOrRace(_))
    }
}

impl From<RepositoryError> for MessagingError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => MessagingError::NotFound("entity".to_string()),
            RepositoryError::Conflict(msg) => MessagingError::ConflictOrRace(msg),
            RepositoryError::Connection => {
                MessagingError::DependencyUnavailable("database connection".to_string())
            }
            RepositoryError::Query(msg) => MessagingError::DependencyUnavailable(msg),
            RepositoryError::Rejected(msg) => MessagingError::InvalidArgument(msg),
        }
    }
}
