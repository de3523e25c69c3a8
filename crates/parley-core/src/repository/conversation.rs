//! Conversation repository trait definition.
//!
//! Defines the storage interface for conversation rows: idempotent creation,
//! scoped listing, flag updates, and moderation transitions that commit
//! together with their audit record.

use chrono::{DateTime, Utc};
use parley_types::audit::AuditLogEntry;
use parley_types::conversation::{
    Conversation, ConversationId, ConversationKey, ConversationPatch, ConversationStatus,
};
use parley_types::error::RepositoryError;
use parley_types::identity::Party;
use parley_types::page::Cursor;

/// Filter for listing conversations.
#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    /// Restrict to conversations where the given account sits on the given
    /// side. `None` lists across all participants (admin view).
    pub participant: Option<(Party, String)>,
    /// Only this status.
    pub status: Option<ConversationStatus>,
    /// Drop closed conversations. Ignored when `status` is set.
    pub exclude_closed: bool,
    /// Only rows after this `(updated_at, id)` position.
    pub after: Option<Cursor>,
    /// Maximum rows to fetch.
    pub limit: u32,
}

/// Result of a guarded status transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The patch and the audit entry were committed together.
    Applied(Conversation),
    /// The conversation was not in one of the allowed source states.
    /// Nothing was written.
    Rejected(ConversationStatus),
    /// No conversation with that id.
    NotFound,
}

/// Repository trait for conversation persistence.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ConversationRepository: Send + Sync {
    /// Insert `conversation` unless one with the same key already exists.
    ///
    /// Returns the stored conversation and `true` when it was newly created.
    /// Must be safe against concurrent callers with the same key: exactly one
    /// row is ever created.
    fn create_or_get(
        &self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<(Conversation, bool), RepositoryError>> + Send;

    /// Look up a conversation by its idempotency key.
    fn find_by_key(
        &self,
        key: &ConversationKey,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    /// Get a conversation by id.
    fn get_by_id(
        &self,
        id: &ConversationId,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    /// List conversations ordered by `updated_at` DESC.
    fn list(
        &self,
        filter: &ConversationFilter,
    ) -> impl std::future::Future<Output = Result<Vec<Conversation>, RepositoryError>> + Send;

    /// Apply a patch to the non-summary fields and set `updated_at`.
    ///
    /// Returns `None` if the conversation does not exist.
    fn update_flags(
        &self,
        id: &ConversationId,
        patch: &ConversationPatch,
        updated_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    /// Move a conversation to a new status in one transaction.
    ///
    /// Reads the current status, checks it against `allowed_from`, applies
    /// `patch` with `updated_at`, and appends `audit`. Either all of it is
    /// committed or nothing is.
    fn transition(
        &self,
        id: &ConversationId,
        allowed_from: &[ConversationStatus],
        patch: &ConversationPatch,
        updated_at: DateTime<Utc>,
        audit: &AuditLogEntry,
    ) -> impl std::future::Future<Output = Result<TransitionOutcome, RepositoryError>> + Send;

    /// Sum of `party`-side unread counters over the account's non-closed
    /// conversations.
    fn unread_total(
        &self,
        user_id: &str,
        party: Party,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Flagged conversations ordered by `flagged_at` DESC.
    fn list_flagged(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Conversation>, RepositoryError>> + Send;
}
