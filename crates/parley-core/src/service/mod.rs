//! Messaging services.
//!
//! Each service is generic over the repository traits it needs, so the core
//! never depends on a storage technology. [`messaging::MessagingService`]
//! composes them into the single surface the rest of the marketplace calls.

pub mod audit;
pub mod conversation;
pub mod message;
pub mod messaging;
pub mod moderation;
pub mod paging;
pub mod retry;

use parley_types::error::{MessagingError, RepositoryError};

/// Map a repository error, naming the entity on `NotFound`.
pub(crate) fn storage_err(entity: &'static str) -> impl Fn(RepositoryError) -> MessagingError {
    move |e| match e {
        RepositoryError::NotFound => MessagingError::NotFound(entity.to_string()),
        other => MessagingError::from(other),
    }
}

pub(crate) fn not_found(entity: &'static str) -> MessagingError {
    MessagingError::NotFound(entity.to_string())
}
