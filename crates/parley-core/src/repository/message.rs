//! Message repository trait definition.
//!
//! Message writes are always mediated through the owning conversation: every
//! method that changes read or delete state also keeps the conversation's
//! summary and unread counters consistent, inside one transaction.

use chrono::{DateTime, Utc};
use parley_types::conversation::{Conversation, ConversationId};
use parley_types::error::RepositoryError;
use parley_types::identity::Party;
use parley_types::message::{Message, MessageId};
use parley_types::page::Cursor;

/// Filter for listing messages of one conversation.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    /// Only rows after this `(created_at, id)` position.
    pub after: Option<Cursor>,
    /// Maximum rows to fetch.
    pub limit: u32,
    /// Include soft-deleted messages (moderation views).
    pub include_deleted: bool,
}

/// Repository trait for message persistence.
pub trait MessageRepository: Send + Sync {
    /// Insert a message and update its conversation in one transaction.
    ///
    /// The conversation's `last_message_*` fields take the message's values
    /// (with `preview` as content), `updated_at` becomes the message's
    /// `created_at`, and the recipient's unread counter is incremented by
    /// exactly one. Admin annotations touch no counter.
    ///
    /// Returns `RepositoryError::NotFound` without writing anything if the
    /// conversation does not exist, and `RepositoryError::Rejected` if it is
    /// closed at the time of the write. Returns the updated conversation.
    fn create(
        &self,
        message: &Message,
        preview: &str,
    ) -> impl std::future::Future<Output = Result<Conversation, RepositoryError>> + Send;

    /// Get a message by id, deleted or not.
    fn get_by_id(
        &self,
        id: &MessageId,
    ) -> impl std::future::Future<Output = Result<Option<Message>, RepositoryError>> + Send;

    /// List messages ordered by `created_at` DESC, then id DESC.
    fn list(
        &self,
        conversation_id: &ConversationId,
        filter: &MessageFilter,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, RepositoryError>> + Send;

    /// Set `is_read`/`read_at` on a single unread message.
    ///
    /// Does not touch the conversation's counters. Returns `false` if the
    /// message was already read or does not exist.
    fn mark_read(
        &self,
        id: &MessageId,
        read_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Mark every unread message not authored by `reader_id` as read and
    /// reset the `reader` side's unread counter to zero, in one transaction.
    ///
    /// Returns the number of messages marked, or `RepositoryError::NotFound`
    /// if the conversation does not exist.
    fn mark_conversation_read(
        &self,
        conversation_id: &ConversationId,
        reader: Party,
        reader_id: &str,
        read_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Soft-delete a message.
    ///
    /// If the message still counted as unread for its recipient, the
    /// recipient's counter is decremented (never below zero) in the same
    /// transaction. Deleting an already deleted message changes nothing.
    /// Returns the message as stored afterwards, or `None` if it does not exist.
    fn soft_delete(
        &self,
        id: &MessageId,
        deleted_by: &str,
        deleted_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Option<Message>, RepositoryError>> + Send;
}
