//! Audit log repository trait definition.

use parley_types::audit::AuditLogEntry;
use parley_types::conversation::ConversationId;
use parley_types::error::RepositoryError;

/// Append-only audit storage: no update or delete path.
pub trait AuditRepository: Send + Sync {
    /// Persist one entry.
    fn append(
        &self,
        entry: &AuditLogEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Most recent entries first, optionally for one conversation.
    fn query(
        &self,
        conversation_id: Option<&ConversationId>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<AuditLogEntry>, RepositoryError>> + Send;
}
